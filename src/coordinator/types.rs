use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::coordinator::error::UploadError;
use crate::session::{TaskId, UploadSnapshot, UploadStatus};

/// Inputs to the per-task state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadEvent {
    Start,
    DigestReady { empty_plan: bool },
    ProbeCompleted { missing: usize },
    DrainCompleted,
    Pause,
    Resume,
    MergeSucceeded,
    Fail,
    Cancel,
}

/// Outcome of one scheduling pass over a set of pending chunks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub attempted: usize,
    pub stored: usize,
    pub failed: Vec<u32>,
    pub canceled: usize,
}

/// Caller-facing callbacks. Invoked from the driver task, so
/// implementations should return quickly.
pub trait UploadObserver: Send + Sync {
    fn on_progress(&self, snapshot: &UploadSnapshot, percent: f64);

    fn on_success(&self, snapshot: &UploadSnapshot, response: &Value);

    fn on_error(&self, snapshot: &UploadSnapshot, error: &UploadError);

    fn on_status(&self, _snapshot: &UploadSnapshot, _status: UploadStatus) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl UploadObserver for NoopObserver {
    fn on_progress(&self, _snapshot: &UploadSnapshot, _percent: f64) {}

    fn on_success(&self, _snapshot: &UploadSnapshot, _response: &Value) {}

    fn on_error(&self, _snapshot: &UploadSnapshot, _error: &UploadError) {}
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UploadNotification {
    Status {
        id: TaskId,
        status: UploadStatus,
    },
    Progress {
        id: TaskId,
        percent: f64,
    },
    Success {
        snapshot: UploadSnapshot,
        response: Value,
    },
    Error {
        snapshot: UploadSnapshot,
        message: String,
    },
}

impl UploadNotification {
    pub fn task_id(&self) -> TaskId {
        match self {
            UploadNotification::Status { id, .. } | UploadNotification::Progress { id, .. } => *id,
            UploadNotification::Success { snapshot, .. }
            | UploadNotification::Error { snapshot, .. } => snapshot.id,
        }
    }
}

/// Forwards every callback into an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<UploadNotification>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, notification: UploadNotification) {
        // Receiver gone means nobody is listening anymore.
        let _ = self.tx.send(notification);
    }
}

impl UploadObserver for ChannelObserver {
    fn on_progress(&self, snapshot: &UploadSnapshot, percent: f64) {
        self.forward(UploadNotification::Progress {
            id: snapshot.id,
            percent,
        });
    }

    fn on_success(&self, snapshot: &UploadSnapshot, response: &Value) {
        self.forward(UploadNotification::Success {
            snapshot: snapshot.clone(),
            response: response.clone(),
        });
    }

    fn on_error(&self, snapshot: &UploadSnapshot, error: &UploadError) {
        self.forward(UploadNotification::Error {
            snapshot: snapshot.clone(),
            message: error.to_string(),
        });
    }

    fn on_status(&self, snapshot: &UploadSnapshot, status: UploadStatus) {
        self.forward(UploadNotification::Status {
            id: snapshot.id,
            status,
        });
    }
}
