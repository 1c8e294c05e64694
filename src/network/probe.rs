use std::collections::HashSet;
use std::sync::Arc;

use crate::integrity::Digest;
use crate::metrics;
use crate::network::transport::UploadTransport;

/// Asks the server which chunks of a digest it already holds.
///
/// Failure here only costs time: the caller falls back to uploading
/// everything, so errors are logged and turned into an empty set.
#[derive(Clone)]
pub struct ResumeProbe {
    transport: Arc<dyn UploadTransport>,
}

impl ResumeProbe {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self { transport }
    }

    pub async fn probe(&self, digest: &Digest) -> HashSet<u32> {
        match self.transport.probe(digest).await {
            Ok(indices) => {
                metrics::record_probe(indices.len());
                indices.into_iter().collect()
            }
            Err(e) => {
                tracing::warn!(%digest, error = %e, "resume probe failed, uploading from scratch");
                metrics::record_probe_fallback();
                HashSet::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::error::{NetworkError, NetworkResult};
    use crate::network::types::{ChunkUploadRequest, MergeRequest, MergeResponse};
    use futures::future::BoxFuture;
    use futures::FutureExt;

    struct FixedProbe(Option<Vec<u32>>);

    impl UploadTransport for FixedProbe {
        fn probe<'a>(&'a self, _digest: &'a Digest) -> BoxFuture<'a, NetworkResult<Vec<u32>>> {
            let result = self.0.clone().ok_or(NetworkError::UnexpectedStatus {
                url: "check".into(),
                status: 503,
                body: String::new(),
            });
            async move { result }.boxed()
        }

        fn upload_chunk(&self, _request: ChunkUploadRequest) -> BoxFuture<'_, NetworkResult<()>> {
            async { Ok(()) }.boxed()
        }

        fn merge<'a>(
            &'a self,
            _request: &'a MergeRequest,
        ) -> BoxFuture<'a, NetworkResult<MergeResponse>> {
            async { Ok(MergeResponse::Completed(serde_json::Value::Null)) }.boxed()
        }
    }

    #[tokio::test]
    async fn test_probe_returns_server_indices() {
        let probe = ResumeProbe::new(Arc::new(FixedProbe(Some(vec![0, 1, 1, 4]))));
        let present = probe.probe(&Digest::from_hex("ab")).await;
        assert_eq!(present, HashSet::from([0, 1, 4]));
    }

    #[tokio::test]
    async fn test_probe_failure_means_nothing_uploaded() {
        let probe = ResumeProbe::new(Arc::new(FixedProbe(None)));
        assert!(probe.probe(&Digest::from_hex("ab")).await.is_empty());
    }
}
