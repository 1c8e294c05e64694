use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::integrity::HashAlgorithm;

/// Settings of the reference endpoint server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory holding `chunks/` and `files/`.
    pub root: PathBuf,
    /// Route prefix of the check/chunk/merge endpoints.
    pub prefix: String,
    /// Must match the algorithm clients hash with.
    pub hash_algorithm: HashAlgorithm,
    /// Request body limit for chunk uploads.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./uploads"),
            prefix: "/upload".to_string(),
            hash_algorithm: HashAlgorithm::default(),
            max_body_bytes: 64 * 1024 * 1024,
        }
    }
}

impl ServerConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..Self::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    /// Prefix without a trailing slash; empty mounts at the root.
    pub fn route_prefix(&self) -> &str {
        self.prefix.trim_end_matches('/')
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkStoredResponse {
    pub hash: String,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: u32,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MergedFileResponse {
    pub hash: String,
    pub filename: String,
    pub size: u64,
    /// Location relative to the server root, e.g. `files/<hash>/<filename>`.
    pub path: String,
}
