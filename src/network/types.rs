use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::integrity::Digest;

/// Multipart field names of the chunk endpoint.
pub mod fields {
    pub const CHUNK: &str = "chunk";
    pub const HASH: &str = "hash";
    pub const CHUNK_INDEX: &str = "chunkIndex";
    pub const TOTAL_CHUNKS: &str = "totalChunks";
    pub const FILENAME: &str = "filename";
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeRequest {
    pub digest: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProbeResponse {
    #[serde(rename = "uploadedChunks", default)]
    pub uploaded_chunks: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergeRequest {
    pub hash: String,
    pub filename: String,
    #[serde(rename = "totalChunks")]
    pub total_chunks: u32,
}

/// One chunk ready to go on the wire.
#[derive(Debug, Clone)]
pub struct ChunkUploadRequest {
    pub digest: Digest,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub file_name: String,
    pub data: Bytes,
}

/// What the merge endpoint answered, when it answered at all.
#[derive(Debug, Clone, PartialEq)]
pub enum MergeResponse {
    Completed(serde_json::Value),
    Failed { status: u16, body: String },
}

impl MergeResponse {
    /// A 4xx whose body names missing chunks, e.g. `chunk 3 missing` or
    /// `chunks not found`. Those failures are recoverable by re-uploading.
    pub fn is_missing_chunk_report(&self) -> bool {
        match self {
            MergeResponse::Completed(_) => false,
            MergeResponse::Failed { status, body } => {
                let body = body.to_ascii_lowercase();
                (400..500).contains(status)
                    && body.contains("chunk")
                    && (body.contains("missing") || body.contains("not found"))
            }
        }
    }
}
