use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("chunk {} missing", .missing.first().copied().unwrap_or_default())]
    MissingChunks { missing: Vec<u32> },

    #[error("Digest mismatch: expected {expected}, assembled {actual}")]
    DigestMismatch { expected: String, actual: String },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_message = self.to_string();

        let (status, body) = match self {
            ApiError::InvalidRequest(_) => (
                StatusCode::BAD_REQUEST,
                json!({ "error": error_message, "code": "INVALID_REQUEST" }),
            ),
            ApiError::MissingChunks { missing } => (
                StatusCode::CONFLICT,
                json!({ "error": error_message, "code": "MISSING_CHUNKS", "missing": missing }),
            ),
            ApiError::DigestMismatch { .. } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                json!({ "error": error_message, "code": "DIGEST_MISMATCH" }),
            ),
            ApiError::Storage(_) | ApiError::InternalError(_) => {
                tracing::error!(error = %error_message, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": error_message, "code": "INTERNAL_ERROR" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
