use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::scheduler::ConcurrencyScheduler;
use crate::metrics;
use crate::network::{MergeRequest, MergeResponse, ResumeProbe, UploadTransport};
use crate::session::UploadTask;

/// Asks the server to assemble a file and repairs the gaps it reports.
///
/// A merge answered with a missing-chunk report triggers a recovery: probe
/// again, reset the chunk state from the answer, upload what is still
/// missing, merge again. At most `max_retries` recoveries are attempted.
#[derive(Clone)]
pub struct MergeCoordinator {
    transport: Arc<dyn UploadTransport>,
    probe: ResumeProbe,
    scheduler: ConcurrencyScheduler,
    max_retries: u32,
}

impl MergeCoordinator {
    pub fn new(
        transport: Arc<dyn UploadTransport>,
        scheduler: ConcurrencyScheduler,
        max_retries: u32,
    ) -> Self {
        Self {
            probe: ResumeProbe::new(transport.clone()),
            transport,
            scheduler,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub async fn run<F>(
        &self,
        task: &UploadTask,
        token: &CancellationToken,
        on_stored: F,
    ) -> UploadResult<Value>
    where
        F: Fn(u32) + Send + Sync,
    {
        let file_name = task.file_name().to_string();
        let digest = task
            .digest()
            .cloned()
            .ok_or_else(|| UploadError::Internal(format!("{file_name} has no digest")))?;

        let request = MergeRequest {
            hash: digest.to_string(),
            filename: file_name.clone(),
            total_chunks: task.plan().total_chunks(),
        };

        let mut retries = 0;
        loop {
            if token.is_cancelled() {
                return Err(UploadError::Canceled);
            }

            metrics::record_merge_attempt();
            let response = tokio::select! {
                biased;

                _ = token.cancelled() => return Err(UploadError::Canceled),
                response = self.transport.merge(&request) => response,
            };

            let missing_report = matches!(&response, Ok(r) if r.is_missing_chunk_report());
            let (status, body) = match response {
                Ok(MergeResponse::Completed(payload)) => {
                    tracing::info!(file = %file_name, %digest, retries, "merge completed");
                    return Ok(payload);
                }
                Ok(MergeResponse::Failed { status, body }) if missing_report => (status, body),
                Ok(MergeResponse::Failed { status, body }) => {
                    return Err(UploadError::MergeRejected {
                        file_name,
                        status,
                        body,
                    });
                }
                Err(e) => {
                    return Err(UploadError::MergeUnavailable {
                        file_name,
                        reason: e.to_string(),
                    });
                }
            };

            if retries >= self.max_retries {
                tracing::error!(file = %file_name, retries, "merge still missing chunks, giving up");
                return Err(UploadError::ChunkRecoveryExhausted { file_name, retries });
            }
            retries += 1;

            let present = tokio::select! {
                biased;

                _ = token.cancelled() => return Err(UploadError::Canceled),
                present = self.probe.probe(&digest) => present,
            };
            task.reset_chunks(&present);
            let missing = task.missing_chunks();

            tracing::warn!(
                file = %file_name,
                status,
                body = %body,
                attempt = retries,
                missing = missing.len(),
                "merge reported missing chunks, re-uploading"
            );
            metrics::record_merge_recovery(missing.len());

            self.scheduler
                .drain(task, missing, token, &on_stored)
                .await?;
        }
    }
}
