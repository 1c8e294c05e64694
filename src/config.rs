//! Caller-facing configuration for the upload engine.
//!
//! Everything except `action` is optional. Configs can be built in code
//! (`UploadConfig::new(action).with_*`) or deserialized from JSON.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunk::DEFAULT_CHUNK_SIZE;
use crate::coordinator::{UploadError, UploadResult};
use crate::integrity::HashAlgorithm;

pub const DEFAULT_MAX_CONCURRENT: i32 = 3;
pub const DEFAULT_MAX_MERGE_RETRIES: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    /// Base URL the three endpoints hang off (`{action}/check` etc).
    pub action: String,
    pub check_url: Option<String>,
    pub chunk_url: Option<String>,
    pub merge_url: Option<String>,
    pub chunk_size: u64,
    /// Values `<= 0` behave as 1.
    pub max_concurrent: i32,
    pub max_merge_retries: u32,
    /// Comma-separated extensions (`.png`), MIME types (`image/png`) or
    /// wildcards (`image/*`).
    pub accept: Option<String>,
    pub max_size: Option<u64>,
    pub hash_algorithm: HashAlgorithm,
    pub request_timeout_secs: Option<u64>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            action: String::new(),
            check_url: None,
            chunk_url: None,
            merge_url: None,
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            max_merge_retries: DEFAULT_MAX_MERGE_RETRIES,
            accept: None,
            max_size: None,
            hash_algorithm: HashAlgorithm::default(),
            request_timeout_secs: None,
        }
    }
}

impl UploadConfig {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> UploadResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| UploadError::InvalidConfig(format!("malformed config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn from_json_file(path: &Path) -> UploadResult<Self> {
        let json = tokio::fs::read_to_string(path).await.map_err(|e| {
            UploadError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_str(&json)
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_concurrent(mut self, max_concurrent: i32) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub fn with_max_merge_retries(mut self, retries: u32) -> Self {
        self.max_merge_retries = retries;
        self
    }

    pub fn with_accept(mut self, accept: impl Into<String>) -> Self {
        self.accept = Some(accept.into());
        self
    }

    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = Some(max_size);
        self
    }

    pub fn with_hash_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.hash_algorithm = algorithm;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_secs = Some(timeout.as_secs().max(1));
        self
    }

    pub fn validate(&self) -> UploadResult<()> {
        if self.chunk_size == 0 {
            return Err(UploadError::InvalidConfig(
                "chunk_size must be greater than zero".into(),
            ));
        }
        let endpoints_overridden =
            self.check_url.is_some() && self.chunk_url.is_some() && self.merge_url.is_some();
        if self.action.trim().is_empty() && !endpoints_overridden {
            return Err(UploadError::InvalidConfig(
                "action is required unless all endpoint URLs are given".into(),
            ));
        }
        Ok(())
    }

    /// Effective in-flight limit per file.
    pub fn concurrency_limit(&self) -> usize {
        self.max_concurrent.max(1) as usize
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    pub fn endpoints(&self) -> Endpoints {
        let defaults = Endpoints::from_action(&self.action);
        Endpoints {
            check: self.check_url.clone().unwrap_or(defaults.check),
            chunk: self.chunk_url.clone().unwrap_or(defaults.chunk),
            merge: self.merge_url.clone().unwrap_or(defaults.merge),
        }
    }
}

/// Fully resolved endpoint URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub check: String,
    pub chunk: String,
    pub merge: String,
}

impl Endpoints {
    pub fn from_action(action: &str) -> Self {
        let base = action.trim_end_matches('/');
        Self {
            check: format!("{base}/check"),
            chunk: format!("{base}/chunk"),
            merge: format!("{base}/merge"),
        }
    }
}
