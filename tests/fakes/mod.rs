//! Scripted transport and recording observer shared by integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chunkstream_upload::coordinator::{UploadError, UploadObserver};
use chunkstream_upload::integrity::Digest;
use chunkstream_upload::network::{
    ChunkUploadRequest, MergeRequest, MergeResponse, NetworkError, NetworkResult, UploadTransport,
};
use chunkstream_upload::session::{TaskId, UploadSnapshot, UploadStatus};
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;

/// Scripted answer of the probe endpoint.
#[derive(Debug, Clone)]
pub enum ProbeAnswer {
    Present(Vec<u32>),
    Unavailable,
}

/// Scripted answer of the merge endpoint.
#[derive(Debug, Clone)]
pub enum MergeAnswer {
    Done(Value),
    Missing(u32),
    Status(u16, String),
    Unreachable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkCall {
    pub index: u32,
    pub total_chunks: u32,
    pub len: usize,
    pub hash: String,
    pub file_name: String,
}

/// In-memory stand-in for the three endpoints.
///
/// Probe and merge scripts are consumed front to back; the last entry keeps
/// answering once the script runs out.
pub struct ScriptedTransport {
    probes: Mutex<VecDeque<ProbeAnswer>>,
    merges: Mutex<VecDeque<MergeAnswer>>,
    chunk_failures: Mutex<HashMap<u32, usize>>,
    chunk_delay: Mutex<Duration>,
    gate: watch::Sender<bool>,
    free_passes: AtomicUsize,
    blocked: Arc<AtomicUsize>,

    probe_calls: AtomicUsize,
    chunk_calls: Mutex<Vec<ChunkCall>>,
    merge_calls: Mutex<Vec<MergeRequest>>,
    in_flight: Arc<AtomicUsize>,
    peak_in_flight: AtomicUsize,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            probes: Mutex::new(VecDeque::from([ProbeAnswer::Present(Vec::new())])),
            merges: Mutex::new(VecDeque::from([MergeAnswer::Done(
                serde_json::json!({ "status": "merged" }),
            )])),
            chunk_failures: Mutex::new(HashMap::new()),
            chunk_delay: Mutex::new(Duration::ZERO),
            gate,
            free_passes: AtomicUsize::new(0),
            blocked: Arc::new(AtomicUsize::new(0)),
            probe_calls: AtomicUsize::new(0),
            chunk_calls: Mutex::new(Vec::new()),
            merge_calls: Mutex::new(Vec::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak_in_flight: AtomicUsize::new(0),
        }
    }
}

struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

fn next_scripted<T: Clone>(script: &Mutex<VecDeque<T>>) -> T {
    let mut script = script.lock();
    if script.len() > 1 {
        script.pop_front().expect("script has entries")
    } else {
        script.front().cloned().expect("script must not be empty")
    }
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn probes(self: Arc<Self>, answers: Vec<ProbeAnswer>) -> Arc<Self> {
        *self.probes.lock() = answers.into();
        self
    }

    pub fn merges(self: Arc<Self>, answers: Vec<MergeAnswer>) -> Arc<Self> {
        *self.merges.lock() = answers.into();
        self
    }

    /// Fail the next `times` uploads of chunk `index`.
    pub fn fail_chunk(self: Arc<Self>, index: u32, times: usize) -> Arc<Self> {
        self.chunk_failures.lock().insert(index, times);
        self
    }

    pub fn chunk_delay(self: Arc<Self>, delay: Duration) -> Arc<Self> {
        *self.chunk_delay.lock() = delay;
        self
    }

    /// Hold every chunk upload until `open_gate`.
    pub fn close_gate(&self) {
        self.gate.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.gate.send_replace(true);
    }

    /// Let the first `free` chunk uploads through, then hold the rest until
    /// `open_gate`.
    pub fn hold_after(self: Arc<Self>, free: usize) -> Arc<Self> {
        self.free_passes.store(free, Ordering::SeqCst);
        self.close_gate();
        self
    }

    pub fn probe_calls(&self) -> usize {
        self.probe_calls.load(Ordering::SeqCst)
    }

    pub fn chunk_calls(&self) -> Vec<ChunkCall> {
        self.chunk_calls.lock().clone()
    }

    pub fn uploaded_indices(&self) -> Vec<u32> {
        self.chunk_calls.lock().iter().map(|c| c.index).collect()
    }

    pub fn merge_calls(&self) -> Vec<MergeRequest> {
        self.merge_calls.lock().clone()
    }

    pub fn total_calls(&self) -> usize {
        self.probe_calls() + self.chunk_calls.lock().len() + self.merge_calls.lock().len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    /// Poll until `n` chunk uploads are blocked in flight.
    pub async fn wait_in_flight(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.in_flight() < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("chunk uploads never reached the transport");
    }

    /// Poll until `n` chunk uploads are waiting at the closed gate.
    pub async fn wait_blocked(&self, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.blocked.load(Ordering::SeqCst) < n {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("no chunk upload reached the gate");
    }
}

impl UploadTransport for ScriptedTransport {
    fn probe<'a>(&'a self, _digest: &'a Digest) -> BoxFuture<'a, NetworkResult<Vec<u32>>> {
        self.probe_calls.fetch_add(1, Ordering::SeqCst);
        let answer = next_scripted(&self.probes);
        async move {
            match answer {
                ProbeAnswer::Present(indices) => Ok(indices),
                ProbeAnswer::Unavailable => Err(NetworkError::UnexpectedStatus {
                    url: "check".into(),
                    status: 503,
                    body: "unavailable".into(),
                }),
            }
        }
        .boxed()
    }

    fn upload_chunk(&self, request: ChunkUploadRequest) -> BoxFuture<'_, NetworkResult<()>> {
        async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            let _guard = InFlight(self.in_flight.clone());
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            let free = self
                .free_passes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if !free {
                self.blocked.fetch_add(1, Ordering::SeqCst);
                let _waiting = InFlight(self.blocked.clone());
                let mut gate = self.gate.subscribe();
                let _ = gate.wait_for(|open| *open).await;
            }

            let delay = *self.chunk_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            self.chunk_calls.lock().push(ChunkCall {
                index: request.chunk_index,
                total_chunks: request.total_chunks,
                len: request.data.len(),
                hash: request.digest.to_string(),
                file_name: request.file_name.clone(),
            });

            let mut failures = self.chunk_failures.lock();
            if let Some(remaining) = failures.get_mut(&request.chunk_index) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(NetworkError::UnexpectedStatus {
                        url: "chunk".into(),
                        status: 500,
                        body: "write failed".into(),
                    });
                }
            }
            Ok(())
        }
        .boxed()
    }

    fn merge<'a>(&'a self, request: &'a MergeRequest) -> BoxFuture<'a, NetworkResult<MergeResponse>> {
        self.merge_calls.lock().push(request.clone());
        let answer = next_scripted(&self.merges);
        async move {
            match answer {
                MergeAnswer::Done(payload) => Ok(MergeResponse::Completed(payload)),
                MergeAnswer::Missing(index) => Ok(MergeResponse::Failed {
                    status: 409,
                    body: format!(r#"{{"error":"chunk {index} missing","missing":[{index}]}}"#),
                }),
                MergeAnswer::Status(status, body) => Ok(MergeResponse::Failed { status, body }),
                MergeAnswer::Unreachable => Err(NetworkError::RequestFailed {
                    url: "merge".into(),
                    reason: "connection refused".into(),
                }),
            }
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Status(TaskId, UploadStatus),
    Progress(TaskId, f64),
    Success(TaskId, Value),
    Error(TaskId, String),
}

/// Observer keeping every callback in order.
#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Recorded>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<Recorded> {
        self.events.lock().clone()
    }

    pub fn progress(&self, id: TaskId) -> Vec<f64> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Progress(task, percent) if *task == id => Some(*percent),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self, id: TaskId) -> Vec<UploadStatus> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Status(task, status) if *task == id => Some(*status),
                _ => None,
            })
            .collect()
    }

    pub fn successes(&self, id: TaskId) -> Vec<Value> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Success(task, payload) if *task == id => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self, id: TaskId) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                Recorded::Error(task, message) if *task == id => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Progress, success and error callbacks; status changes excluded.
    pub fn outcome_callbacks(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| !matches!(e, Recorded::Status(..)))
            .count()
    }
}

impl UploadObserver for RecordingObserver {
    fn on_progress(&self, snapshot: &UploadSnapshot, percent: f64) {
        self.events.lock().push(Recorded::Progress(snapshot.id, percent));
    }

    fn on_success(&self, snapshot: &UploadSnapshot, response: &Value) {
        self.events
            .lock()
            .push(Recorded::Success(snapshot.id, response.clone()));
    }

    fn on_error(&self, snapshot: &UploadSnapshot, error: &UploadError) {
        self.events
            .lock()
            .push(Recorded::Error(snapshot.id, error.to_string()));
    }

    fn on_status(&self, snapshot: &UploadSnapshot, status: UploadStatus) {
        self.events.lock().push(Recorded::Status(snapshot.id, status));
    }
}
