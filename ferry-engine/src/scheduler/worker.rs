//! Job worker
//!
//! Drives one job from `pending` to a terminal state: claim, workspace,
//! execution, finalize, cleanup.

use ferry_core::domain::job::{JobStatus, Transition};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::repository::{JobStore, TransitionOutcome};
use crate::service::cancellation::CancellationRegistry;
use crate::service::executor::{ExecutionOutcome, TaskExecutor};
use crate::service::log_capture::{LogSink, StoreLogSink};

/// Everything a worker needs to run a job
pub struct Worker {
    store: Arc<JobStore>,
    registry: Arc<CancellationRegistry>,
    executor: Arc<dyn TaskExecutor>,
    config: Arc<EngineConfig>,
}

impl Worker {
    pub fn new(
        store: Arc<JobStore>,
        registry: Arc<CancellationRegistry>,
        executor: Arc<dyn TaskExecutor>,
        config: Arc<EngineConfig>,
    ) -> Self {
        Self {
            store,
            registry,
            executor,
            config,
        }
    }

    /// Runs a single job to completion
    ///
    /// `token` is registered before the job is claimed, so a cancellation
    /// that lands between claim and spawn still stops the job.
    pub async fn run(&self, job_id: Uuid, token: CancellationToken) {
        let _guard = self.registry.register(job_id, token.clone());

        if token.is_cancelled() {
            debug!("Not claiming job {}: engine is stopping", job_id);
            return;
        }

        match self
            .store
            .transition(job_id, JobStatus::Pending, Transition::Start)
        {
            Ok(TransitionOutcome::Applied(_)) => {}
            Ok(TransitionOutcome::Lost { current }) => {
                debug!("Job {} is {} instead of pending, skipping", job_id, current);
                return;
            }
            Err(e) => {
                error!("Failed to claim job {}: {}", job_id, e);
                return;
            }
        }

        let job = match self.store.get(job_id) {
            Ok(job) => job,
            Err(e) => {
                error!("Claimed job {} vanished: {}", job_id, e);
                return;
            }
        };

        info!(
            "Starting job {} ({})",
            job_id,
            job.job_name.as_deref().unwrap_or(&job.script_path)
        );

        let workspace = match self.create_workspace(job_id) {
            Ok(workspace) => workspace,
            Err(e) => {
                error!("Failed to create workspace for job {}: {}", job_id, e);
                self.finalize(
                    job_id,
                    ExecutionOutcome::Failed(format!("failed to create workspace: {}", e)),
                );
                return;
            }
        };

        let timer = self.config.job_timeout.map(|limit| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(limit) => {
                        warn!("Job {} exceeded its {:?} time limit, cancelling", job_id, limit);
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let sink: Arc<dyn LogSink> = Arc::new(StoreLogSink::new(Arc::clone(&self.store), job_id));
        let executor = Arc::clone(&self.executor);
        let path = workspace.path().to_path_buf();
        let execution =
            tokio::spawn(async move { executor.execute(job, path, sink, token).await });

        let outcome = match execution.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Executor for job {} panicked: {}", job_id, e);
                ExecutionOutcome::Failed("executor panicked".to_string())
            }
        };

        if let Some(timer) = timer {
            timer.abort();
        }

        self.finalize(job_id, outcome);

        if let Err(e) = workspace.close() {
            warn!("Failed to remove workspace of job {}: {}", job_id, e);
        }
    }

    fn create_workspace(&self, job_id: Uuid) -> std::io::Result<TempDir> {
        std::fs::create_dir_all(&self.config.workspace_base)?;
        tempfile::Builder::new()
            .prefix(&format!("ferry-{}-", job_id))
            .tempdir_in(&self.config.workspace_base)
    }

    /// Records the outcome, unless cancellation already claimed the job
    fn finalize(&self, job_id: Uuid, outcome: ExecutionOutcome) {
        let transition = match outcome {
            ExecutionOutcome::Completed(result) => Transition::Complete(result),
            ExecutionOutcome::Failed(message) => Transition::Fail(message),
            ExecutionOutcome::Cancelled => Transition::Cancel,
        };

        match self
            .store
            .transition(job_id, JobStatus::Running, transition)
        {
            Ok(TransitionOutcome::Applied(status)) => {
                info!("Job {} finished: {}", job_id, status);
            }
            Ok(TransitionOutcome::Lost { current }) => {
                warn!(
                    "Job {} was already {} when its worker finished",
                    job_id, current
                );
            }
            Err(e) => error!("Failed to finalize job {}: {}", job_id, e),
        }
    }
}
