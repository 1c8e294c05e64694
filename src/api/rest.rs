use crate::api::error::{ApiError, ApiResult};
use crate::api::storage::ChunkStore;
use crate::api::types::{ChunkStoredResponse, MergedFileResponse, ServerConfig};
use crate::integrity::Digest;
use crate::metrics;
use crate::network::fields;
use crate::network::{MergeRequest, ProbeRequest, ProbeResponse};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use std::sync::Arc;

/// Check/chunk/merge endpoints over a [`ChunkStore`].
pub struct RestApi {
    store: Arc<ChunkStore>,
    config: ServerConfig,
}

impl RestApi {
    pub fn new(store: ChunkStore, config: ServerConfig) -> Self {
        Self {
            store: Arc::new(store),
            config,
        }
    }

    pub fn router(&self) -> Router {
        let prefix = self.config.route_prefix();

        Router::new()
            .route("/health", get(health_check))
            .route(&format!("{prefix}/check"), post(check_chunks))
            .route(&format!("{prefix}/chunk"), post(upload_chunk))
            .route(&format!("{prefix}/merge"), post(merge_chunks))
            .layer(DefaultBodyLimit::max(self.config.max_body_bytes))
            .with_state(self.store.clone())
    }
}

async fn health_check() -> &'static str {
    "OK"
}

fn parse_digest(raw: &str) -> ApiResult<Digest> {
    let digest = Digest::from_hex(raw.trim());
    if !digest.is_well_formed() {
        return Err(ApiError::InvalidRequest(format!("malformed hash `{raw}`")));
    }
    Ok(digest)
}

/// File names become path components; anything that could escape the
/// digest directory is refused.
fn parse_filename(raw: &str) -> ApiResult<String> {
    let name = raw.trim();
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.contains('\0')
    {
        return Err(ApiError::InvalidRequest(format!("invalid filename `{raw}`")));
    }
    Ok(name.to_string())
}

async fn check_chunks(
    State(store): State<Arc<ChunkStore>>,
    Json(req): Json<ProbeRequest>,
) -> ApiResult<Json<ProbeResponse>> {
    let digest = parse_digest(&req.digest)?;
    let uploaded_chunks = store.stored_chunks(&digest).await?;

    tracing::debug!(%digest, stored = uploaded_chunks.len(), "probe");
    Ok(Json(ProbeResponse { uploaded_chunks }))
}

async fn upload_chunk(
    State(store): State<Arc<ChunkStore>>,
    mut multipart: Multipart,
) -> ApiResult<Json<ChunkStoredResponse>> {
    let mut data: Option<Bytes> = None;
    let mut hash: Option<String> = None;
    let mut chunk_index: Option<u32> = None;
    let mut total_chunks: Option<u32> = None;
    let mut filename: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::InvalidRequest(format!("Failed to read multipart field: {e}")))?
    {
        let name = field.name().unwrap_or("").to_string();

        if name == fields::CHUNK {
            data = Some(field.bytes().await.map_err(|e| {
                ApiError::InvalidRequest(format!("Failed to read chunk data: {e}"))
            })?);
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| ApiError::InvalidRequest(format!("Failed to read `{name}`: {e}")))?;

        match name.as_str() {
            fields::HASH => hash = Some(value),
            fields::CHUNK_INDEX => {
                chunk_index = Some(value.trim().parse().map_err(|_| {
                    ApiError::InvalidRequest(format!("invalid chunkIndex `{value}`"))
                })?)
            }
            fields::TOTAL_CHUNKS => {
                total_chunks = Some(value.trim().parse().map_err(|_| {
                    ApiError::InvalidRequest(format!("invalid totalChunks `{value}`"))
                })?)
            }
            fields::FILENAME => filename = Some(value),
            _ => {}
        }
    }

    let missing_field = |field: &str| ApiError::InvalidRequest(format!("missing field `{field}`"));
    let data = data.ok_or_else(|| missing_field(fields::CHUNK))?;
    let digest = parse_digest(&hash.ok_or_else(|| missing_field(fields::HASH))?)?;
    let chunk_index = chunk_index.ok_or_else(|| missing_field(fields::CHUNK_INDEX))?;
    let total_chunks = total_chunks.ok_or_else(|| missing_field(fields::TOTAL_CHUNKS))?;
    let filename = parse_filename(&filename.ok_or_else(|| missing_field(fields::FILENAME))?)?;

    if chunk_index >= total_chunks {
        return Err(ApiError::InvalidRequest(format!(
            "chunkIndex {chunk_index} out of range for {total_chunks} chunks"
        )));
    }

    store.store_chunk(&digest, chunk_index, &data).await?;
    metrics::record_server_chunk_received(data.len());
    tracing::debug!(%digest, file = %filename, chunk = chunk_index, size = data.len(), "chunk stored");

    Ok(Json(ChunkStoredResponse {
        hash: digest.to_string(),
        chunk_index,
        size: data.len(),
    }))
}

async fn merge_chunks(
    State(store): State<Arc<ChunkStore>>,
    Json(req): Json<MergeRequest>,
) -> ApiResult<Json<MergedFileResponse>> {
    let digest = parse_digest(&req.hash)?;
    let filename = parse_filename(&req.filename)?;

    let merged = match store.merge(&digest, &filename, req.total_chunks).await {
        Ok(merged) => merged,
        Err(e) => {
            let outcome = match &e {
                ApiError::MissingChunks { .. } => "missing",
                ApiError::DigestMismatch { .. } => "mismatch",
                _ => "error",
            };
            metrics::record_server_merge(outcome);
            tracing::warn!(%digest, file = %filename, error = %e, "merge refused");
            return Err(e);
        }
    };

    metrics::record_server_merge("ok");
    tracing::info!(%digest, file = %filename, size = merged.size, "file merged");

    Ok(Json(MergedFileResponse {
        hash: digest.to_string(),
        filename,
        size: merged.size,
        path: merged.relative_path,
    }))
}
