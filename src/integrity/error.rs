use thiserror::Error;

#[derive(Error, Debug)]
pub enum IntegrityError {
    #[error("Hashing failed for {file}: {reason}")]
    HashingFailed { file: String, reason: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Digest mismatch: expected {expected}, got {actual}")]
    DigestMismatch { expected: String, actual: String },
}

pub type IntegrityResult<T> = Result<T, IntegrityError>;
