use std::sync::Arc;

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::session::types::{TaskId, UploadTask};

/// Every task the manager knows about, terminal ones included. Tasks are
/// only evicted by an explicit `remove`.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: DashMap<TaskId, Arc<UploadTask>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task: Arc<UploadTask>) {
        self.tasks.insert(task.id(), task);
    }

    pub fn get(&self, id: &TaskId) -> Option<Arc<UploadTask>> {
        self.tasks.get(id).map(|entry| entry.value().clone())
    }

    pub fn remove(&self, id: &TaskId) -> Option<Arc<UploadTask>> {
        self.tasks.remove(id).map(|(_, task)| task)
    }

    /// All tasks, oldest submission first.
    pub fn list(&self) -> Vec<Arc<UploadTask>> {
        let mut tasks: Vec<_> = self.tasks.iter().map(|e| e.value().clone()).collect();
        tasks.sort_by_key(|task| task.sequence());
        tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// Cancellation tokens of running passes, keyed by task.
#[derive(Debug, Default)]
pub struct CancelRegistry {
    tokens: DashMap<TaskId, CancellationToken>,
}

impl CancelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fresh token for a new pass. Replaces (and revokes) any leftover one.
    pub fn issue(&self, id: TaskId) -> CancellationToken {
        let token = CancellationToken::new();
        if let Some(previous) = self.tokens.insert(id, token.clone()) {
            previous.cancel();
        }
        token
    }

    /// Revoke the pass's token. Idempotent; `false` when no pass holds one.
    pub fn revoke(&self, id: &TaskId) -> bool {
        match self.tokens.get(id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Drop the token once its pass has ended.
    pub fn release(&self, id: &TaskId) {
        self.tokens.remove(id);
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.tokens.contains_key(id)
    }
}
