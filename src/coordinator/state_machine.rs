use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::types::UploadEvent;
use crate::session::UploadStatus;
use tokio::sync::watch;

/// Status holder for one task. Every change goes through `transition`, and
/// watchers see each applied status via `subscribe`.
#[derive(Debug)]
pub struct UploadStateMachine {
    status: watch::Sender<UploadStatus>,
}

impl Default for UploadStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl UploadStateMachine {
    pub fn new() -> Self {
        let (status, _) = watch::channel(UploadStatus::Ready);
        Self { status }
    }

    /// Get current status
    pub fn current(&self) -> UploadStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<UploadStatus> {
        self.status.subscribe()
    }

    /// Apply `event` atomically with respect to other transitions.
    pub fn transition(&self, event: UploadEvent) -> UploadResult<UploadStatus> {
        let mut outcome = Err(UploadError::InvalidStateTransition(String::new()));

        self.status.send_if_modified(|status| match next_status(*status, event) {
            Some(next) => {
                *status = next;
                outcome = Ok(next);
                true
            }
            None => {
                outcome = Err(UploadError::InvalidStateTransition(format!(
                    "cannot handle {event:?} in state {status}"
                )));
                false
            }
        });

        outcome
    }
}

fn next_status(current: UploadStatus, event: UploadEvent) -> Option<UploadStatus> {
    use UploadStatus::*;

    let next = match (current, event) {
        (Ready, UploadEvent::Start) => Hashing,

        // Digest known: an empty file has nothing to probe or upload
        (Hashing, UploadEvent::DigestReady { empty_plan: false }) => Probing,
        (Hashing, UploadEvent::DigestReady { empty_plan: true }) => Merging,

        // Server already has everything: skip straight to merge
        (Probing, UploadEvent::ProbeCompleted { missing: 0 }) => Merging,
        (Probing, UploadEvent::ProbeCompleted { .. }) => Uploading,

        (Uploading, UploadEvent::DrainCompleted) => Merging,

        // Pause / resume
        (Uploading, UploadEvent::Pause) => Paused,
        (Paused, UploadEvent::Resume) => Uploading,

        (Merging, UploadEvent::MergeSucceeded) => Success,

        (status, UploadEvent::Fail) if !status.is_terminal() => Error,
        (status, UploadEvent::Cancel) if !status.is_terminal() => Canceled,

        // Invalid transition
        _ => return None,
    };

    Some(next)
}
