//! Metrics recorder for upload operations
//!
//! Client-side counters cover probes, chunk uploads and merges; the
//! reference server records what it receives and assembles.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

static METRICS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Initialize metric descriptions (call once at startup)
pub fn init_metrics() {
    if METRICS_INITIALIZED.swap(true, Ordering::SeqCst) {
        return;
    }

    describe_counter!("upload_probes_total", "Resume probes answered by the server");
    describe_counter!(
        "upload_probe_fallbacks_total",
        "Resume probes that failed and fell back to a full upload"
    );
    describe_counter!(
        "upload_probe_chunks_present_total",
        "Chunks the server reported as already stored"
    );

    describe_counter!("upload_chunks_sent_total", "Chunks accepted by the server");
    describe_counter!("upload_chunks_failed_total", "Chunk uploads that failed");
    describe_counter!(
        "upload_chunks_cancelled_total",
        "Chunk uploads aborted by pause or cancel"
    );
    describe_counter!("upload_bytes_sent_total", "Chunk bytes accepted by the server");

    describe_counter!("upload_merge_attempts_total", "Merge requests sent");
    describe_counter!(
        "upload_merge_recoveries_total",
        "Missing-chunk recoveries triggered by merge"
    );

    describe_counter!("upload_tasks_started_total", "Upload tasks admitted");
    describe_counter!("upload_tasks_completed_total", "Upload tasks merged successfully");
    describe_counter!("upload_tasks_failed_total", "Upload tasks ending in error");
    describe_counter!("upload_tasks_rejected_total", "Files refused at admission");
    describe_gauge!("upload_active_tasks", "Upload passes currently running");

    describe_histogram!(
        "upload_chunk_duration_seconds",
        "Time to upload a single chunk"
    );
    describe_histogram!("upload_task_duration_seconds", "Submission to merge duration");

    describe_counter!("upload_server_chunks_received_total", "Chunks stored by the server");
    describe_counter!(
        "upload_server_bytes_received_total",
        "Chunk bytes stored by the server"
    );
    describe_counter!("upload_server_merges_total", "Merge requests handled by the server");
}

// ============== Probe ==============

pub fn record_probe(chunks_present: usize) {
    counter!("upload_probes_total").increment(1);
    counter!("upload_probe_chunks_present_total").increment(chunks_present as u64);
}

pub fn record_probe_fallback() {
    counter!("upload_probe_fallbacks_total").increment(1);
}

// ============== Chunk Operations ==============

pub fn record_chunk_uploaded(chunk_size: usize, duration: Duration) {
    counter!("upload_chunks_sent_total").increment(1);
    counter!("upload_bytes_sent_total").increment(chunk_size as u64);
    histogram!("upload_chunk_duration_seconds").record(duration.as_secs_f64());
}

pub fn record_chunk_failed() {
    counter!("upload_chunks_failed_total").increment(1);
}

pub fn record_chunk_cancelled() {
    counter!("upload_chunks_cancelled_total").increment(1);
}

// ============== Merge ==============

pub fn record_merge_attempt() {
    counter!("upload_merge_attempts_total").increment(1);
}

pub fn record_merge_recovery(missing_chunks: usize) {
    counter!("upload_merge_recoveries_total").increment(1);
    histogram!("upload_merge_recovery_chunks").record(missing_chunks as f64);
}

// ============== Task Lifecycle ==============

pub fn record_task_rejected(reason: &str) {
    counter!("upload_tasks_rejected_total", "reason" => reason.to_string()).increment(1);
}

pub fn record_pass_started() {
    gauge!("upload_active_tasks").increment(1.0);
}

pub fn record_pass_finished() {
    gauge!("upload_active_tasks").decrement(1.0);
}

// ============== Server ==============

pub fn record_server_chunk_received(chunk_size: usize) {
    counter!("upload_server_chunks_received_total").increment(1);
    counter!("upload_server_bytes_received_total").increment(chunk_size as u64);
}

pub fn record_server_merge(outcome: &str) {
    counter!("upload_server_merges_total", "outcome" => outcome.to_string()).increment(1);
}

/// Tracks one upload task from admission to its terminal state.
pub struct TaskMetrics {
    start_time: Instant,
}

impl TaskMetrics {
    pub fn start(file_size: u64) -> Self {
        counter!("upload_tasks_started_total").increment(1);
        histogram!("upload_task_size_bytes").record(file_size as f64);

        Self {
            start_time: Instant::now(),
        }
    }

    pub fn complete(&self) {
        counter!("upload_tasks_completed_total").increment(1);
        histogram!("upload_task_duration_seconds").record(self.elapsed().as_secs_f64());
    }

    pub fn fail(&self, reason: &str) {
        counter!("upload_tasks_failed_total", "reason" => reason.to_string()).increment(1);
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}
