use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::chunk::{Chunker, SourceFile};
use crate::config::UploadConfig;
use crate::coordinator::error::{UploadError, UploadResult};
use crate::coordinator::merge::MergeCoordinator;
use crate::coordinator::scheduler::ConcurrencyScheduler;
use crate::coordinator::types::{NoopObserver, UploadEvent, UploadObserver};
use crate::integrity::{ContentHasher, StreamingHasher};
use crate::metrics::{self, TaskMetrics};
use crate::network::{ChunkUploadWorker, HttpTransport, ResumeProbe, UploadTransport};
use crate::session::{
    Admission, BeforeUpload, CancelRegistry, TaskId, TaskRegistry, UploadSnapshot, UploadStatus,
    UploadTask,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PassKind {
    /// Hash, probe, upload what is missing, merge.
    Fresh,
    /// Digest and chunk state are kept; upload what is missing, merge.
    Resume,
}

/// Entry point of the engine: owns every task, spawns one driver pass per
/// task at a time and routes pause/resume/cancel to it.
#[derive(Clone)]
pub struct UploadSessionManager {
    config: Arc<UploadConfig>,
    chunker: Chunker,
    admission: Admission,
    hasher: Arc<dyn ContentHasher>,
    probe: ResumeProbe,
    scheduler: ConcurrencyScheduler,
    merger: MergeCoordinator,
    observer: Arc<dyn UploadObserver>,
    tasks: Arc<TaskRegistry>,
    cancels: Arc<CancelRegistry>,
}

impl UploadSessionManager {
    pub fn new(
        config: UploadConfig,
        transport: Arc<dyn UploadTransport>,
        observer: Arc<dyn UploadObserver>,
    ) -> UploadResult<Self> {
        config.validate()?;

        let chunker =
            Chunker::new(config.chunk_size).map_err(|e| UploadError::InvalidConfig(e.to_string()))?;
        let scheduler = ConcurrencyScheduler::new(
            ChunkUploadWorker::new(transport.clone()),
            config.concurrency_limit(),
        );
        let merger =
            MergeCoordinator::new(transport.clone(), scheduler.clone(), config.max_merge_retries);

        Ok(Self {
            chunker,
            admission: Admission::from_config(&config),
            hasher: Arc::new(StreamingHasher::new(config.hash_algorithm)),
            probe: ResumeProbe::new(transport),
            scheduler,
            merger,
            observer,
            tasks: Arc::new(TaskRegistry::new()),
            cancels: Arc::new(CancelRegistry::new()),
            config: Arc::new(config),
        })
    }

    /// Manager talking to the configured endpoints over HTTP.
    pub fn with_http(config: UploadConfig, observer: Arc<dyn UploadObserver>) -> UploadResult<Self> {
        let transport = HttpTransport::from_config(&config)
            .map_err(|e| UploadError::InvalidConfig(e.to_string()))?;
        Self::new(config, Arc::new(transport), observer)
    }

    /// Manager without callbacks; poll `status`/`snapshot` or `subscribe`.
    pub fn without_observer(
        config: UploadConfig,
        transport: Arc<dyn UploadTransport>,
    ) -> UploadResult<Self> {
        Self::new(config, transport, Arc::new(NoopObserver))
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn ContentHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_before_upload(mut self, hook: Arc<dyn BeforeUpload>) -> Self {
        self.admission = self.admission.with_before_upload(hook);
        self
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Admit `source`, create its task and start uploading in the background.
    ///
    /// A refused file yields `AdmissionRejected`; no task is created and no
    /// callback fires.
    pub async fn submit(&self, source: SourceFile) -> UploadResult<TaskId> {
        if let Err(rejection) = self.admission.check(&source).await {
            tracing::info!(file = source.name(), reason = %rejection, "upload refused");
            metrics::record_task_rejected(rejection.reason());
            return Err(rejection.into());
        }

        let plan = self.chunker.plan(source.size());
        let task = Arc::new(UploadTask::new(source, plan));
        let id = task.id();
        self.tasks.insert(task.clone());

        tracing::info!(
            task = %id,
            file = task.file_name(),
            size = task.source().size(),
            chunks = task.plan().total_chunks(),
            "upload submitted"
        );

        if !task.try_begin_pass() {
            return Err(UploadError::Internal(format!("fresh task {id} already has a pass")));
        }
        self.spawn_pass(task, PassKind::Fresh);

        Ok(id)
    }

    /// Stop a task that is uploading. Chunk state is kept for `resume`.
    pub async fn pause(&self, id: TaskId) -> UploadResult<()> {
        let task = self.task(&id)?;
        task.transition(UploadEvent::Pause)?;
        self.notify_status(&task);

        self.cancels.revoke(&id);
        Self::join_pass(&task).await;

        tracing::info!(task = %id, progress = task.progress(), "upload paused");
        Ok(())
    }

    /// Continue a paused task with the chunks still missing.
    ///
    /// Returns `Ok(false)` without doing anything while a pass for the task
    /// is still running.
    pub async fn resume(&self, id: TaskId) -> UploadResult<bool> {
        let task = self.task(&id)?;
        if !task.try_begin_pass() {
            tracing::debug!(task = %id, "resume ignored, pass still running");
            return Ok(false);
        }

        if let Err(e) = task.transition(UploadEvent::Resume) {
            task.end_pass();
            return Err(e);
        }
        self.notify_status(&task);

        tracing::info!(task = %id, missing = task.missing_chunks().len(), "upload resumed");
        self.spawn_pass(task, PassKind::Resume);
        Ok(true)
    }

    /// Abort a task from any non-terminal state. No callback fires for it
    /// afterwards.
    pub async fn cancel(&self, id: TaskId) -> UploadResult<()> {
        let task = self.task(&id)?;
        task.transition(UploadEvent::Cancel)?;
        self.notify_status(&task);

        self.cancels.revoke(&id);
        Self::join_pass(&task).await;

        tracing::info!(task = %id, "upload canceled");
        Ok(())
    }

    /// Forget a task, canceling it first if it is still live.
    pub async fn remove(&self, id: TaskId) -> UploadResult<UploadSnapshot> {
        let task = self.task(&id)?;
        if !task.status().is_terminal() {
            // Losing a race with the pass reaching a terminal state is fine.
            if let Err(e) = self.cancel(id).await {
                tracing::debug!(task = %id, error = %e, "cancel before remove skipped");
            }
        }
        Self::join_pass(&task).await;

        self.tasks.remove(&id);
        Ok(task.snapshot())
    }

    pub fn status(&self, id: TaskId) -> UploadResult<UploadStatus> {
        Ok(self.task(&id)?.status())
    }

    pub fn progress(&self, id: TaskId) -> UploadResult<f64> {
        Ok(self.task(&id)?.progress())
    }

    pub fn snapshot(&self, id: TaskId) -> UploadResult<UploadSnapshot> {
        Ok(self.task(&id)?.snapshot())
    }

    pub fn list(&self) -> Vec<UploadSnapshot> {
        self.tasks.list().iter().map(|task| task.snapshot()).collect()
    }

    pub fn subscribe(&self, id: TaskId) -> UploadResult<watch::Receiver<UploadStatus>> {
        Ok(self.task(&id)?.subscribe())
    }

    /// Wait until the task is terminal or paused and its pass has finished
    /// delivering callbacks.
    pub async fn wait_settled(&self, id: TaskId) -> UploadResult<UploadStatus> {
        let task = self.task(&id)?;
        let mut rx = task.subscribe();
        if rx.wait_for(|status| status.is_settled()).await.is_err() {
            return Err(UploadError::TaskNotFound(id.to_string()));
        }
        task.wait_pass_idle().await;
        Ok(task.status())
    }

    fn task(&self, id: &TaskId) -> UploadResult<Arc<UploadTask>> {
        self.tasks
            .get(id)
            .ok_or_else(|| UploadError::TaskNotFound(id.to_string()))
    }

    async fn join_pass(task: &UploadTask) {
        if let Some(handle) = task.take_driver() {
            if let Err(e) = handle.await {
                tracing::error!(task = %task.id(), error = %e, "upload pass aborted");
            }
        }
        task.wait_pass_idle().await;
    }

    fn notify_status(&self, task: &UploadTask) {
        let snapshot = task.snapshot();
        self.observer.on_status(&snapshot, snapshot.status);
    }

    /// Caller must hold the task's pass slot (`try_begin_pass`).
    fn spawn_pass(&self, task: Arc<UploadTask>, kind: PassKind) {
        let token = self.cancels.issue(task.id());
        let manager = self.clone();
        let pass_task = task.clone();

        task.spawn_driver(move || tokio::spawn(manager.run_pass(pass_task, token, kind)));
    }

    async fn run_pass(self, task: Arc<UploadTask>, token: CancellationToken, kind: PassKind) {
        metrics::record_pass_started();
        let task_metrics = TaskMetrics::start(task.source().size());

        let outcome = std::panic::AssertUnwindSafe(self.drive(&task, &token, kind))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "upload pass panicked".to_string());
                Err(UploadError::Internal(message))
            });

        self.cancels.release(&task.id());

        match outcome {
            Ok(payload) => self.succeed(&task, &payload, &task_metrics),
            Err(UploadError::Canceled) => {
                tracing::debug!(task = %task.id(), status = %task.status(), "pass stopped");
            }
            Err(e) if Self::interrupted(&task, &token) => {
                tracing::debug!(task = %task.id(), error = %e, "pass stopped while failing");
            }
            Err(e) => self.fail(&task, e, &task_metrics),
        }

        task.end_pass();
        metrics::record_pass_finished();
    }

    async fn drive(
        &self,
        task: &UploadTask,
        token: &CancellationToken,
        kind: PassKind,
    ) -> UploadResult<Value> {
        if kind == PassKind::Fresh {
            self.advance(task, token, UploadEvent::Start)?;

            let digest = tokio::select! {
                biased;

                _ = token.cancelled() => return Err(UploadError::Canceled),
                digest = self.hasher.hash(task.source()) => digest,
            }
            .map_err(|source| UploadError::HashingFailed {
                file_name: task.file_name().to_string(),
                source,
            })?;

            tracing::debug!(task = %task.id(), %digest, "digest computed");
            task.set_digest(digest.clone());

            let empty_plan = task.plan().is_empty();
            self.advance(task, token, UploadEvent::DigestReady { empty_plan })?;

            if !empty_plan {
                let present = tokio::select! {
                    biased;

                    _ = token.cancelled() => return Err(UploadError::Canceled),
                    present = self.probe.probe(&digest) => present,
                };
                task.reset_chunks(&present);

                let progress = task.progress();
                if progress > 0.0 {
                    self.observer.on_progress(&task.snapshot(), progress);
                }

                let missing = task.missing_chunks().len();
                tracing::info!(task = %task.id(), missing, "resume probe finished");
                self.advance(task, token, UploadEvent::ProbeCompleted { missing })?;
            }
        }

        if task.status() == UploadStatus::Uploading {
            let report = self
                .scheduler
                .drain(task, task.missing_chunks(), token, |_| {
                    self.report_progress(task, token)
                })
                .await?;

            if token.is_cancelled() {
                return Err(UploadError::Canceled);
            }
            if !report.failed.is_empty() {
                tracing::warn!(
                    task = %task.id(),
                    failed = ?report.failed,
                    "some chunks failed, merge will decide"
                );
            }
            self.advance(task, token, UploadEvent::DrainCompleted)?;
        }

        self.merger
            .run(task, token, |_| self.report_progress(task, token))
            .await
    }

    /// Scheduler callback: the chunk is already stored when this runs.
    fn report_progress(&self, task: &UploadTask, token: &CancellationToken) {
        if Self::interrupted(task, token) {
            return;
        }
        let snapshot = task.snapshot();
        self.observer.on_progress(&snapshot, snapshot.progress);
    }

    /// Apply `event` and notify. A transition refused because pause/cancel
    /// moved the task meanwhile surfaces as `Canceled`.
    fn advance(
        &self,
        task: &UploadTask,
        token: &CancellationToken,
        event: UploadEvent,
    ) -> UploadResult<UploadStatus> {
        match task.transition(event) {
            Ok(status) => {
                self.notify_status(task);
                Ok(status)
            }
            Err(_) if Self::interrupted(task, token) => Err(UploadError::Canceled),
            Err(e) => Err(e),
        }
    }

    /// Pause and cancel move the status before revoking the token, so
    /// either one means the pass must stop quietly.
    fn interrupted(task: &UploadTask, token: &CancellationToken) -> bool {
        token.is_cancelled()
            || matches!(task.status(), UploadStatus::Paused | UploadStatus::Canceled)
    }

    fn succeed(&self, task: &UploadTask, payload: &Value, task_metrics: &TaskMetrics) {
        if task.transition(UploadEvent::MergeSucceeded).is_err() {
            // Canceled between the merge answer and now.
            return;
        }
        if !task.try_finish() {
            return;
        }

        tracing::info!(
            task = %task.id(),
            file = task.file_name(),
            elapsed_ms = task_metrics.elapsed().as_millis() as u64,
            "upload complete"
        );
        task_metrics.complete();

        let snapshot = task.snapshot();
        self.observer.on_status(&snapshot, snapshot.status);
        self.observer.on_success(&snapshot, payload);
    }

    fn fail(&self, task: &UploadTask, error: UploadError, task_metrics: &TaskMetrics) {
        task.record_error(error.to_string());
        if task.transition(UploadEvent::Fail).is_err() || !task.try_finish() {
            return;
        }

        tracing::error!(task = %task.id(), file = task.file_name(), error = %error, "upload failed");
        task_metrics.fail(error.kind());

        let snapshot = task.snapshot();
        self.observer.on_status(&snapshot, snapshot.status);
        self.observer.on_error(&snapshot, &error);
    }
}
