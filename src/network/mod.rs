pub mod error;
pub mod http;
pub mod probe;
pub mod transport;
pub mod types;
pub mod worker;

pub use error::{NetworkError, NetworkResult};
pub use http::HttpTransport;
pub use probe::ResumeProbe;
pub use transport::UploadTransport;
pub use types::{
    fields, ChunkUploadRequest, MergeRequest, MergeResponse, ProbeRequest, ProbeResponse,
};
pub use worker::ChunkUploadWorker;
