use serde::{Deserialize, Serialize};

/// Half-open byte range `[start, end)` of a source file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// Ordered chunk layout of one file. Chunk indices are the resume contract
/// with the server, so a plan never changes once built.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkPlan {
    pub file_size: u64,
    pub chunk_size: u64,
    ranges: Vec<ByteRange>,
}

impl ChunkPlan {
    pub(crate) fn from_ranges(file_size: u64, chunk_size: u64, ranges: Vec<ByteRange>) -> Self {
        Self {
            file_size,
            chunk_size,
            ranges,
        }
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total chunk count as sent on the wire.
    pub fn total_chunks(&self) -> u32 {
        self.ranges.len() as u32
    }

    pub fn get(&self, index: u32) -> Option<ByteRange> {
        self.ranges.get(index as usize).copied()
    }

    pub fn ranges(&self) -> &[ByteRange] {
        &self.ranges
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> {
        0..self.total_chunks()
    }
}
