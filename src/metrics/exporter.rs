//! Prometheus metrics exporter
//!
//! The reference server mounts `metrics_route()` so uploads can be scraped
//! from the same listener that serves the upload endpoints.

use crate::metrics::recorder::init_metrics;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

/// Global prometheus handle
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Path for metrics endpoint (default: "/metrics")
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            endpoint: "/metrics".to_string(),
        }
    }
}

/// Install the Prometheus recorder.
///
/// Can only install once; later calls return the existing handle.
pub fn install_recorder() -> Result<&'static PrometheusHandle, MetricsError> {
    init_metrics();

    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle);
    }

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| MetricsError::SetupFailed(e.to_string()))?;

    let _ = PROMETHEUS_HANDLE.set(handle);

    PROMETHEUS_HANDLE.get().ok_or(MetricsError::AlreadyInitialized)
}

/// Render metrics as a string (for custom endpoints)
pub fn render_metrics() -> Option<String> {
    PROMETHEUS_HANDLE.get().map(|h| h.render())
}

/// Errors that can occur during metrics setup
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to setup metrics: {0}")]
    SetupFailed(String),

    #[error("Metrics already initialized")]
    AlreadyInitialized,
}

/// Axum route serving the rendered metrics.
pub fn metrics_route() -> axum::routing::MethodRouter {
    use axum::response::IntoResponse;

    axum::routing::get(|| async {
        match render_metrics() {
            Some(metrics) => (
                [(
                    axum::http::header::CONTENT_TYPE,
                    "text/plain; charset=utf-8",
                )],
                metrics,
            )
                .into_response(),
            None => (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                "Metrics not initialized",
            )
                .into_response(),
        }
    })
}
