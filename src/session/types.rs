use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::chunk::{ChunkPlan, SourceFile};
use crate::coordinator::error::UploadResult;
use crate::coordinator::state_machine::UploadStateMachine;
use crate::coordinator::types::UploadEvent;
use crate::integrity::Digest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Ready,
    Hashing,
    Probing,
    Uploading,
    Merging,
    Success,
    Error,
    Paused,
    Canceled,
}

impl UploadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Ready => "ready",
            UploadStatus::Hashing => "hashing",
            UploadStatus::Probing => "probing",
            UploadStatus::Uploading => "uploading",
            UploadStatus::Merging => "merging",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
            UploadStatus::Paused => "paused",
            UploadStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            UploadStatus::Success | UploadStatus::Error | UploadStatus::Canceled
        )
    }

    /// Terminal, or parked until someone calls resume.
    pub fn is_settled(&self) -> bool {
        self.is_terminal() || matches!(self, UploadStatus::Paused)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which chunks the server is known to hold. Same length as the plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkState {
    stored: Vec<bool>,
}

impl ChunkState {
    pub fn new(total_chunks: usize) -> Self {
        Self {
            stored: vec![false; total_chunks],
        }
    }

    pub fn len(&self) -> usize {
        self.stored.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stored.is_empty()
    }

    pub fn is_stored(&self, index: u32) -> bool {
        self.stored.get(index as usize).copied().unwrap_or(false)
    }

    /// Returns `false` for indices outside the plan.
    pub fn mark_stored(&mut self, index: u32) -> bool {
        match self.stored.get_mut(index as usize) {
            Some(slot) => {
                *slot = true;
                true
            }
            None => false,
        }
    }

    /// Replace the whole state with what a probe reported. Unknown indices
    /// are ignored.
    pub fn reset_from(&mut self, present: &HashSet<u32>) {
        for (index, slot) in self.stored.iter_mut().enumerate() {
            *slot = present.contains(&(index as u32));
        }
    }

    pub fn missing(&self) -> Vec<u32> {
        self.stored
            .iter()
            .enumerate()
            .filter(|(_, stored)| !**stored)
            .map(|(index, _)| index as u32)
            .collect()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.iter().filter(|stored| **stored).count()
    }

    pub fn all_stored(&self) -> bool {
        self.stored.iter().all(|stored| *stored)
    }

    /// `stored / total * 100`; an empty plan reports 0.
    pub fn percent(&self) -> f64 {
        if self.stored.is_empty() {
            return 0.0;
        }
        self.stored_count() as f64 / self.stored.len() as f64 * 100.0
    }
}

/// Serializable point-in-time view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSnapshot {
    pub id: TaskId,
    pub file_name: String,
    pub file_size: u64,
    pub digest: Option<String>,
    pub status: UploadStatus,
    pub progress: f64,
    pub total_chunks: u32,
    pub uploaded_chunks: u32,
    pub error: Option<String>,
}

static SUBMISSION_SEQ: AtomicU64 = AtomicU64::new(0);

/// One file moving through the engine. Shared as `Arc<UploadTask>` between
/// the manager and the driver pass working on it.
pub struct UploadTask {
    id: TaskId,
    source: SourceFile,
    plan: ChunkPlan,
    digest: OnceLock<Digest>,
    chunk_state: RwLock<ChunkState>,
    state: UploadStateMachine,
    last_error: RwLock<Option<String>>,
    created_at: DateTime<Utc>,
    sequence: u64,
    // Only one driver pass may run per task.
    pass_active: watch::Sender<bool>,
    driver: Mutex<Option<JoinHandle<()>>>,
    // Guards the terminal success/error callback.
    finished: AtomicBool,
}

impl fmt::Debug for UploadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadTask")
            .field("id", &self.id)
            .field("file", &self.source.name())
            .field("status", &self.status())
            .finish()
    }
}

impl UploadTask {
    pub fn new(source: SourceFile, plan: ChunkPlan) -> Self {
        let chunk_state = ChunkState::new(plan.len());
        let (pass_active, _) = watch::channel(false);

        Self {
            id: TaskId::new(),
            source,
            plan,
            digest: OnceLock::new(),
            chunk_state: RwLock::new(chunk_state),
            state: UploadStateMachine::new(),
            last_error: RwLock::new(None),
            created_at: Utc::now(),
            sequence: SUBMISSION_SEQ.fetch_add(1, Ordering::Relaxed),
            pass_active,
            driver: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn source(&self) -> &SourceFile {
        &self.source
    }

    pub fn file_name(&self) -> &str {
        self.source.name()
    }

    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Monotonic submission order across all tasks in the process.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn digest(&self) -> Option<&Digest> {
        self.digest.get()
    }

    /// Returns `false` if a digest was already recorded; the first one wins.
    pub(crate) fn set_digest(&self, digest: Digest) -> bool {
        self.digest.set(digest).is_ok()
    }

    pub fn status(&self) -> UploadStatus {
        self.state.current()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.state.subscribe()
    }

    pub(crate) fn transition(&self, event: UploadEvent) -> UploadResult<UploadStatus> {
        self.state.transition(event)
    }

    /// Percentage of chunks stored. Pinned to 100 once the merge succeeded.
    pub fn progress(&self) -> f64 {
        if self.status() == UploadStatus::Success {
            return 100.0;
        }
        self.chunk_state.read().percent()
    }

    pub fn chunk_state(&self) -> ChunkState {
        self.chunk_state.read().clone()
    }

    pub fn missing_chunks(&self) -> Vec<u32> {
        self.chunk_state.read().missing()
    }

    pub(crate) fn mark_stored(&self, index: u32) -> bool {
        self.chunk_state.write().mark_stored(index)
    }

    pub(crate) fn reset_chunks(&self, present: &HashSet<u32>) {
        self.chunk_state.write().reset_from(present);
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    pub(crate) fn record_error(&self, message: String) {
        *self.last_error.write() = Some(message);
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        let (uploaded, progress) = {
            let state = self.chunk_state.read();
            (state.stored_count() as u32, state.percent())
        };
        let status = self.status();

        UploadSnapshot {
            id: self.id,
            file_name: self.source.name().to_string(),
            file_size: self.source.size(),
            digest: self.digest().map(|d| d.to_string()),
            status,
            progress: if status == UploadStatus::Success {
                100.0
            } else {
                progress
            },
            total_chunks: self.plan.total_chunks(),
            uploaded_chunks: uploaded,
            error: self.last_error(),
        }
    }

    /// Claim the single driver slot. `false` if a pass is already running.
    pub(crate) fn try_begin_pass(&self) -> bool {
        self.pass_active.send_if_modified(|active| {
            if *active {
                false
            } else {
                *active = true;
                true
            }
        })
    }

    pub(crate) fn end_pass(&self) {
        self.pass_active.send_replace(false);
    }

    pub fn is_pass_active(&self) -> bool {
        *self.pass_active.borrow()
    }

    pub(crate) async fn wait_pass_idle(&self) {
        let mut rx = self.pass_active.subscribe();
        let _ = rx.wait_for(|active| !*active).await;
    }

    /// Store the handle of a freshly spawned pass. The lock is held across
    /// the spawn so a concurrent pause/cancel always finds the handle.
    pub(crate) fn spawn_driver<F>(&self, spawn: F)
    where
        F: FnOnce() -> JoinHandle<()>,
    {
        let mut slot = self.driver.lock();
        *slot = Some(spawn());
    }

    pub(crate) fn take_driver(&self) -> Option<JoinHandle<()>> {
        self.driver.lock().take()
    }

    /// `true` exactly once: the caller owns the terminal callback.
    pub(crate) fn try_finish(&self) -> bool {
        !self.finished.swap(true, Ordering::SeqCst)
    }
}
