use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::integrity::Digest;
use crate::metrics;
use crate::network::transport::UploadTransport;
use crate::network::types::ChunkUploadRequest;

/// Uploads single chunks. Never retries: retry policy lives in the merge
/// recovery path.
#[derive(Clone)]
pub struct ChunkUploadWorker {
    transport: Arc<dyn UploadTransport>,
}

impl ChunkUploadWorker {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self { transport }
    }

    /// Returns `true` when the server stored the chunk. Transport failures
    /// and cancellation both return `false`; cancellation is not logged as
    /// a failure.
    pub async fn upload(
        &self,
        digest: &Digest,
        chunk_index: u32,
        total_chunks: u32,
        file_name: &str,
        chunk_bytes: Bytes,
        cancel: &CancellationToken,
    ) -> bool {
        if cancel.is_cancelled() {
            return false;
        }

        let size = chunk_bytes.len();
        let request = ChunkUploadRequest {
            digest: digest.clone(),
            chunk_index,
            total_chunks,
            file_name: file_name.to_string(),
            data: chunk_bytes,
        };

        let started = Instant::now();
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(file = file_name, chunk = chunk_index, "chunk upload cancelled");
                metrics::record_chunk_cancelled();
                false
            }
            result = self.transport.upload_chunk(request) => match result {
                Ok(()) => {
                    metrics::record_chunk_uploaded(size, started.elapsed());
                    true
                }
                Err(e) => {
                    tracing::warn!(
                        file = file_name,
                        chunk = chunk_index,
                        error = %e,
                        "chunk upload failed"
                    );
                    metrics::record_chunk_failed();
                    false
                }
            }
        }
    }
}
