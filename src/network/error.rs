use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Request to {url} failed: {reason}")]
    RequestFailed { url: String, reason: String },

    #[error("{url} returned HTTP {status}: {body}")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },

    #[error("Timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Client setup failed: {0}")]
    ClientSetup(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl NetworkError {
    pub(crate) fn from_reqwest(url: &str, err: reqwest::Error) -> Self {
        NetworkError::RequestFailed {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        NetworkError::SerializationError(err.to_string())
    }
}

pub type NetworkResult<T> = Result<T, NetworkError>;
