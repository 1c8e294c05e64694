//! Chunked, resumable, concurrent file uploads.
//!
//! A file is content-addressed by its digest, split into fixed-size chunks,
//! probed against the server for chunks it already holds, uploaded with a
//! bounded window and finally merged server-side. Missing chunks reported by
//! the merge are re-uploaded a bounded number of times.

pub mod api;
pub mod chunk;
pub mod config;
pub mod coordinator;
pub mod integrity;
pub mod metrics;
pub mod network;
pub mod session;

pub use chunk::SourceFile;
pub use config::UploadConfig;
pub use coordinator::{UploadError, UploadObserver, UploadResult, UploadSessionManager};
pub use session::{TaskId, UploadSnapshot, UploadStatus};
