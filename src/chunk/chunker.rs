use super::error::{ChunkError, Result};
use super::types::{ByteRange, ChunkPlan};

/// 2 MiB, the chunk size used when the caller does not configure one.
pub const DEFAULT_CHUNK_SIZE: u64 = 2 * 1024 * 1024;

/// Splits files into fixed-size byte ranges.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    chunk_size: u64,
}

impl Default for Chunker {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Chunker {
    pub fn new(chunk_size: u64) -> Result<Self> {
        if chunk_size == 0 {
            return Err(ChunkError::InvalidChunkSize(
                "chunk size must be greater than zero".into(),
            ));
        }
        Ok(Self { chunk_size })
    }

    /// Plan the ranges for a file of `file_size` bytes.
    ///
    /// Yields `ceil(file_size / chunk_size)` contiguous ranges; the last one
    /// carries the remainder. A zero-byte file gets an empty plan.
    pub fn plan(&self, file_size: u64) -> ChunkPlan {
        let count = file_size.div_ceil(self.chunk_size);
        let mut ranges = Vec::with_capacity(count as usize);

        let mut offset = 0;
        while offset < file_size {
            let end = std::cmp::min(offset + self.chunk_size, file_size);
            ranges.push(ByteRange { start: offset, end });
            offset = end;
        }

        ChunkPlan::from_ranges(file_size, self.chunk_size, ranges)
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }
}
