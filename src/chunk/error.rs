use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(String),

    #[error("Chunk index {index} out of range for plan of {total} chunks")]
    IndexOutOfRange { index: u32, total: u32 },

    #[error("Short read for {file}: expected {expected} bytes, got {actual}")]
    ShortRead {
        file: String,
        expected: u64,
        actual: u64,
    },
}

pub type Result<T> = std::result::Result<T, ChunkError>;
