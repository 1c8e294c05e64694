//! Metrics and observability module
//!
//! Prometheus-compatible metrics for uploads:
//! - Resume probe hits and fallbacks
//! - Chunk uploads (sent, failed, cancelled) and bytes
//! - Merge attempts and missing-chunk recoveries
//! - Task lifecycle and duration
//! - Reference server receive/merge counters

pub mod exporter;
pub mod recorder;

pub use exporter::{install_recorder, metrics_route, render_metrics, MetricsConfig, MetricsError};
pub use recorder::{
    init_metrics, record_chunk_cancelled, record_chunk_failed, record_chunk_uploaded,
    record_merge_attempt, record_merge_recovery, record_pass_finished, record_pass_started,
    record_probe, record_probe_fallback, record_server_chunk_received, record_server_merge,
    record_task_rejected, TaskMetrics,
};
