use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::types::DrainReport;
use crate::network::ChunkUploadWorker;
use crate::session::UploadTask;

enum ChunkOutcome {
    Stored,
    Failed(u32),
    Canceled,
}

/// Bounded-window chunk uploader. Chunk bytes are read inside the in-flight
/// future, so at most `max_concurrent` chunks are held in memory.
#[derive(Clone)]
pub struct ConcurrencyScheduler {
    worker: ChunkUploadWorker,
    max_concurrent: usize,
}

impl ConcurrencyScheduler {
    pub fn new(worker: ChunkUploadWorker, max_concurrent: usize) -> Self {
        Self {
            worker,
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Attempt every index in `pending` once and return when all attempts
    /// have resolved. Each chunk the server accepted is marked stored on the
    /// task before `on_stored` runs for it.
    pub async fn drain<F>(
        &self,
        task: &UploadTask,
        pending: Vec<u32>,
        token: &CancellationToken,
        on_stored: F,
    ) -> UploadResult<DrainReport>
    where
        F: Fn(u32) + Send + Sync,
    {
        let digest = task
            .digest()
            .cloned()
            .ok_or_else(|| UploadError::Internal(format!("{} has no digest", task.file_name())))?;

        let total_chunks = task.plan().total_chunks();
        let file_name = task.file_name();
        let mut report = DrainReport {
            attempted: pending.len(),
            ..DrainReport::default()
        };

        let digest = &digest;
        let on_stored = &on_stored;
        let mut outcomes = stream::iter(pending)
            .map(|index| async move {
                if token.is_cancelled() {
                    return ChunkOutcome::Canceled;
                }

                let Some(range) = task.plan().get(index) else {
                    return ChunkOutcome::Failed(index);
                };

                let bytes = match task.source().read_range(range).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let err = UploadError::ChunkTransportFailed {
                            index,
                            reason: e.to_string(),
                        };
                        tracing::warn!(file = file_name, error = %err, "could not read chunk");
                        return ChunkOutcome::Failed(index);
                    }
                };

                if self
                    .worker
                    .upload(digest, index, total_chunks, file_name, bytes, token)
                    .await
                {
                    task.mark_stored(index);
                    on_stored(index);
                    ChunkOutcome::Stored
                } else if token.is_cancelled() {
                    ChunkOutcome::Canceled
                } else {
                    ChunkOutcome::Failed(index)
                }
            })
            .buffer_unordered(self.max_concurrent);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                ChunkOutcome::Stored => report.stored += 1,
                ChunkOutcome::Failed(index) => report.failed.push(index),
                ChunkOutcome::Canceled => report.canceled += 1,
            }
        }

        report.failed.sort_unstable();
        tracing::debug!(
            file = file_name,
            attempted = report.attempted,
            stored = report.stored,
            failed = report.failed.len(),
            canceled = report.canceled,
            "drain finished"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Chunker, SourceFile};
    use crate::integrity::Digest;
    use crate::network::{
        ChunkUploadRequest, MergeRequest, MergeResponse, NetworkError, NetworkResult,
        UploadTransport,
    };
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        reject: Vec<u32>,
        seen: Mutex<Vec<(u32, usize)>>,
    }

    impl UploadTransport for CountingTransport {
        fn probe<'a>(&'a self, _digest: &'a Digest) -> BoxFuture<'a, NetworkResult<Vec<u32>>> {
            async { Ok(Vec::new()) }.boxed()
        }

        fn upload_chunk(&self, request: ChunkUploadRequest) -> BoxFuture<'_, NetworkResult<()>> {
            async move {
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);

                self.seen
                    .lock()
                    .push((request.chunk_index, request.data.len()));
                if self.reject.contains(&request.chunk_index) {
                    Err(NetworkError::RequestFailed {
                        url: "chunk".into(),
                        reason: "reset".into(),
                    })
                } else {
                    Ok(())
                }
            }
            .boxed()
        }

        fn merge<'a>(
            &'a self,
            _request: &'a MergeRequest,
        ) -> BoxFuture<'a, NetworkResult<MergeResponse>> {
            async { Ok(MergeResponse::Completed(serde_json::Value::Null)) }.boxed()
        }
    }

    fn hashed_task(size: usize, chunk_size: u64) -> UploadTask {
        let source = SourceFile::from_bytes("data.bin", vec![1u8; size]);
        let plan = Chunker::new(chunk_size).unwrap().plan(source.size());
        let task = UploadTask::new(source, plan);
        task.set_digest(Digest::from_hex("abcd"));
        task
    }

    #[tokio::test]
    async fn test_window_never_exceeded() {
        let transport = Arc::new(CountingTransport::default());
        let scheduler = ConcurrencyScheduler::new(ChunkUploadWorker::new(transport.clone()), 3);
        let task = hashed_task(100, 10);
        let stored = AtomicUsize::new(0);

        let report = scheduler
            .drain(&task, task.missing_chunks(), &CancellationToken::new(), |_| {
                stored.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        assert_eq!(report.attempted, 10);
        assert_eq!(report.stored, 10);
        assert_eq!(stored.load(Ordering::SeqCst), 10);
        assert!(task.missing_chunks().is_empty());
        assert_eq!(task.progress(), 100.0);
        assert!(transport.peak.load(Ordering::SeqCst) <= 3);
        assert!(transport.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_failed_chunks_are_reported_not_retried() {
        let transport = Arc::new(CountingTransport {
            reject: vec![1],
            ..Default::default()
        });
        let scheduler = ConcurrencyScheduler::new(ChunkUploadWorker::new(transport.clone()), 2);
        let task = hashed_task(25, 10);

        let report = scheduler
            .drain(&task, vec![0, 1, 2], &CancellationToken::new(), |_| {})
            .await
            .unwrap();

        assert_eq!(report.stored, 2);
        assert_eq!(report.failed, vec![1]);
        assert_eq!(transport.seen.lock().len(), 3);
        assert_eq!(task.missing_chunks(), vec![1]);

        let mut sizes = transport.seen.lock().clone();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![(0, 10), (1, 10), (2, 5)]);
    }

    #[tokio::test]
    async fn test_revoked_token_starts_nothing() {
        let transport = Arc::new(CountingTransport::default());
        let scheduler = ConcurrencyScheduler::new(ChunkUploadWorker::new(transport.clone()), 4);
        let task = hashed_task(40, 10);
        let token = CancellationToken::new();
        token.cancel();

        let report = scheduler
            .drain(&task, task.missing_chunks(), &token, |_| {})
            .await
            .unwrap();

        assert_eq!(report.canceled, 4);
        assert!(transport.seen.lock().is_empty());
    }

    #[tokio::test]
    async fn test_zero_window_treated_as_one() {
        let transport = Arc::new(CountingTransport::default());
        let scheduler = ConcurrencyScheduler::new(ChunkUploadWorker::new(transport.clone()), 0);
        assert_eq!(scheduler.max_concurrent(), 1);

        let task = hashed_task(30, 10);
        scheduler
            .drain(&task, task.missing_chunks(), &CancellationToken::new(), |_| {})
            .await
            .unwrap();
        assert_eq!(transport.peak.load(Ordering::SeqCst), 1);
    }
}
