use thiserror::Error;

use crate::integrity::IntegrityError;
use crate::session::AdmissionRejection;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("upload refused: {0}")]
    AdmissionRejected(#[from] AdmissionRejection),

    #[error("hashing {file_name} failed: {source}")]
    HashingFailed {
        file_name: String,
        #[source]
        source: IntegrityError,
    },

    #[error("chunk {index} could not be uploaded: {reason}")]
    ChunkTransportFailed { index: u32, reason: String },

    #[error("merge for {file_name} still reports missing chunks after {retries} recoveries")]
    ChunkRecoveryExhausted { file_name: String, retries: u32 },

    #[error("merge for {file_name} was rejected with HTTP {status}: {body}")]
    MergeRejected {
        file_name: String,
        status: u16,
        body: String,
    },

    #[error("merge for {file_name} could not be completed: {reason}")]
    MergeUnavailable { file_name: String, reason: String },

    #[error("upload canceled")]
    Canceled,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    #[error("invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            UploadError::AdmissionRejected(_) => "admission_rejected",
            UploadError::HashingFailed { .. } => "hashing_failed",
            UploadError::ChunkTransportFailed { .. } => "chunk_transport_failed",
            UploadError::ChunkRecoveryExhausted { .. } => "chunk_recovery_exhausted",
            UploadError::MergeRejected { .. } => "merge_rejected",
            UploadError::MergeUnavailable { .. } => "merge_unavailable",
            UploadError::Canceled => "canceled",
            UploadError::TaskNotFound(_) => "task_not_found",
            UploadError::InvalidStateTransition(_) => "invalid_state_transition",
            UploadError::InvalidConfig(_) => "invalid_config",
            UploadError::Internal(_) => "internal",
        }
    }
}

pub type UploadResult<T> = Result<T, UploadError>;
