pub mod chunker;
pub mod error;
pub mod source;
pub mod types;

pub use chunker::{Chunker, DEFAULT_CHUNK_SIZE};
pub use error::{ChunkError, Result};
pub use source::SourceFile;
pub use types::{ByteRange, ChunkPlan};
