//! Job Service
//!
//! The public job API: submit, status, result, log, cancel and list.
//! None of these block on job execution; only cancelling a running job
//! waits, bounded by the grace period, for its process to go away.

use ferry_core::domain::args::JobArgs;
use ferry_core::domain::job::{Job, JobStatus};
use ferry_core::dto::job::{
    CancelOutcome, JobList, JobResultView, JobStatusView, JobSubmitted, JobSummary, SubmitJob,
};
use ferry_core::dto::log::JobLog;
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{JobError, Result};
use crate::repository::JobStore;
use crate::scheduler::{Dispatcher, JobQueue, Worker};
use crate::service::cancellation::{CancellationController, CancellationRegistry, wait_finished};
use crate::service::executor::{ProcessExecutor, TaskExecutor};

/// Default number of log lines returned when the caller does not ask
pub const DEFAULT_LOG_TAIL: usize = 50;

/// Background job manager
///
/// Owns the job store, the dispatch queue and the worker pool. Must be
/// started from within a Tokio runtime.
pub struct JobManager {
    config: Arc<EngineConfig>,
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
    registry: Arc<CancellationRegistry>,
    controller: CancellationController,
    shutdown: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl JobManager {
    /// Starts a manager running jobs as local processes
    pub fn start(config: EngineConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);
        let executor = Arc::new(ProcessExecutor::new(Arc::clone(&config)));
        Self::start_inner(config, executor)
    }

    /// Starts a manager with a custom task executor
    pub fn start_with_executor(
        config: EngineConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> anyhow::Result<Self> {
        Self::start_inner(Arc::new(config), executor)
    }

    fn start_inner(
        config: Arc<EngineConfig>,
        executor: Arc<dyn TaskExecutor>,
    ) -> anyhow::Result<Self> {
        config.validate()?;

        let store = Arc::new(JobStore::new());
        let queue = Arc::new(JobQueue::new());
        let registry = Arc::new(CancellationRegistry::new());
        let shutdown = CancellationToken::new();

        let controller = CancellationController::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&registry),
            cancel_wait_budget(&config),
        );

        let worker = Arc::new(Worker::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            executor,
            Arc::clone(&config),
        ));
        let dispatcher = Dispatcher::new(
            Arc::clone(&queue),
            worker,
            config.max_workers,
            shutdown.clone(),
        )
        .spawn();

        Ok(Self {
            config,
            store,
            queue,
            registry,
            controller,
            shutdown,
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Submits a new job
    ///
    /// Validates the argument mapping, stores the job as `pending` and
    /// queues it. Returns immediately.
    pub fn submit_job(
        &self,
        script_path: &str,
        args: &JsonValue,
        job_name: Option<String>,
    ) -> Result<JobSubmitted> {
        if self.shutdown.is_cancelled() {
            return Err(JobError::ShuttingDown);
        }

        validate_script_path(script_path)?;
        let args = JobArgs::from_json(args)?;
        let job_name = normalize_job_name(job_name)?;

        let job = self.store.create(script_path.to_string(), args, job_name);
        self.queue.push(job.id);

        info!(
            "Job submitted: {} ({}), {} queued",
            job.id,
            job.script_path,
            self.queue.len()
        );

        Ok(JobSubmitted {
            job_id: job.id,
            job_name: job.job_name,
            status: job.status,
        })
    }

    /// Submits a job from its wire representation
    pub fn submit(&self, request: SubmitJob) -> Result<JobSubmitted> {
        self.submit_job(&request.script_path, &request.args, request.job_name)
    }

    /// Gets the status snapshot of a job
    pub fn get_job_status(&self, job_id: Uuid) -> Result<JobStatusView> {
        let job = self.store.get(job_id)?;
        Ok(JobStatusView::from(&job))
    }

    /// Gets the result of a completed job
    ///
    /// Failed and cancelled jobs have no result; their stored error is
    /// surfaced instead. Jobs that are still pending or running are not
    /// ready.
    pub fn get_job_result(&self, job_id: Uuid) -> Result<JobResultView> {
        let job = self.store.get(job_id)?;

        match job.status {
            JobStatus::Completed => Ok(JobResultView {
                job_id,
                result: job.result.unwrap_or(JsonValue::Null),
            }),
            JobStatus::Failed => Err(JobError::NoResult {
                job_id,
                status: job.status,
                message: job.error.unwrap_or_else(|| "job failed".to_string()),
            }),
            JobStatus::Cancelled => Err(JobError::NoResult {
                job_id,
                status: job.status,
                message: "job was cancelled".to_string(),
            }),
            JobStatus::Pending | JobStatus::Running => Err(JobError::NotReady {
                job_id,
                status: job.status,
            }),
        }
    }

    /// Gets the last `tail` captured log lines (`0` means all of them)
    pub fn get_job_log(&self, job_id: Uuid, tail: usize) -> Result<JobLog> {
        let (entries, total_count) = self.store.log_tail(job_id, tail)?;
        Ok(JobLog {
            job_id,
            lines: entries.into_iter().map(|entry| entry.message).collect(),
            total_count,
        })
    }

    /// Cancels a job; a no-op for jobs already in a terminal state
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<CancelOutcome> {
        self.controller.cancel(job_id).await
    }

    /// Lists jobs in submission order, optionally filtered by status
    pub fn list_jobs(&self, status: Option<JobStatus>) -> JobList {
        let jobs: Vec<JobSummary> = self
            .store
            .list(status)
            .into_iter()
            .map(JobSummary::from)
            .collect();
        JobList {
            total: jobs.len(),
            jobs,
        }
    }

    /// Gets the full job record
    pub fn get_job(&self, job_id: Uuid) -> Result<Job> {
        Ok(self.store.get(job_id)?)
    }

    /// Stops the manager
    ///
    /// Dispatching stops, running jobs are cancelled and awaited (bounded by
    /// the same budget as `cancel_job`), pending jobs stay pending. Further
    /// submissions fail.
    pub async fn shutdown(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }

        info!(
            "Shutting down job manager ({} running, {} queued)",
            self.registry.len(),
            self.queue.len()
        );
        self.shutdown.cancel();

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = dispatcher {
            if let Err(e) = handle.await {
                warn!("Dispatcher task failed: {}", e);
            }
        }

        let budget = cancel_wait_budget(&self.config);
        for done in self.registry.pending_runs() {
            if !wait_finished(done, budget).await {
                warn!("A worker did not stop within {:?}", budget);
            }
        }

        info!("Job manager stopped");
    }
}

impl Drop for JobManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// How long cancellation waits for a worker to confirm termination
fn cancel_wait_budget(config: &EngineConfig) -> Duration {
    config.grace_period + config.drain_timeout + Duration::from_secs(1)
}

fn validate_script_path(script_path: &str) -> Result<()> {
    if script_path.trim().is_empty() {
        return Err(JobError::Validation(
            "script_path cannot be empty".to_string(),
        ));
    }

    if script_path.trim_start().starts_with('-') {
        return Err(JobError::Validation(
            "script_path cannot start with '-'".to_string(),
        ));
    }

    if script_path.contains('\0') {
        return Err(JobError::Validation(
            "script_path cannot contain NUL bytes".to_string(),
        ));
    }

    Ok(())
}

fn normalize_job_name(job_name: Option<String>) -> Result<Option<String>> {
    match job_name {
        Some(name) if name.contains('\0') => Err(JobError::Validation(
            "job_name cannot contain NUL bytes".to_string(),
        )),
        Some(name) if name.trim().is_empty() => Ok(None),
        Some(name) => Ok(Some(name.trim().to_string())),
        None => Ok(None),
    }
}
