//! Reference endpoint server for the upload protocol.
//!
//! Serves `check`, `chunk` and `merge` under a configurable prefix and keeps
//! chunks on disk until they are merged.

mod error;
mod rest;
mod storage;
mod types;

pub use error::{ApiError, ApiResult};
pub use rest::RestApi;
pub use storage::{ChunkStore, MergedFile};
pub use types::*;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Open the chunk store under `config.root` and build the full router.
pub async fn create_api_server(config: ServerConfig) -> ApiResult<Router> {
    let store = ChunkStore::open(&config.root, config.hash_algorithm).await?;
    Ok(router_for(store, config))
}

/// Router over an already opened store.
pub fn router_for(store: ChunkStore, config: ServerConfig) -> Router {
    let rest_api = RestApi::new(store, config);

    // Browser uploaders post from other origins
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(rest_api.router())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_api_server_creation() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::new(dir.path().join("store")).with_prefix("/files/");
        let _app = create_api_server(config).await.unwrap();

        assert!(dir.path().join("store").join("chunks").is_dir());
        assert!(dir.path().join("store").join("files").is_dir());
    }
}
