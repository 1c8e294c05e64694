use futures::future::BoxFuture;

use crate::integrity::Digest;
use crate::network::error::NetworkResult;
use crate::network::types::{ChunkUploadRequest, MergeRequest, MergeResponse};

/// The three server endpoints the engine talks to.
///
/// `HttpTransport` is the production implementation; the trait keeps the
/// engine testable against scripted fakes.
pub trait UploadTransport: Send + Sync {
    /// Indices the server already holds for `digest`.
    fn probe<'a>(&'a self, digest: &'a Digest) -> BoxFuture<'a, NetworkResult<Vec<u32>>>;

    /// Upload one chunk. `Ok` means the server stored it.
    fn upload_chunk(&self, request: ChunkUploadRequest) -> BoxFuture<'_, NetworkResult<()>>;

    /// Ask the server to assemble the chunks. HTTP-level failures come back
    /// as `MergeResponse::Failed`; `Err` is reserved for transport failures.
    fn merge<'a>(&'a self, request: &'a MergeRequest)
        -> BoxFuture<'a, NetworkResult<MergeResponse>>;
}
