//! Cancellation controller
//!
//! Moves jobs to `cancelled` without corrupting a job that is finalizing
//! at the same moment. Pending jobs are pulled from the queue and flipped
//! directly; running jobs get their token fired and the worker's
//! termination is awaited before the `running -> cancelled` swap.

use ferry_core::domain::job::{JobStatus, Transition};
use ferry_core::dto::job::CancelOutcome;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::repository::{JobStore, TransitionOutcome};
use crate::scheduler::JobQueue;

struct RunEntry {
    token: CancellationToken,
    done: watch::Receiver<bool>,
}

/// Tokens of jobs currently owned by a worker
#[derive(Default)]
pub struct CancellationRegistry {
    entries: Mutex<HashMap<Uuid, RunEntry>>,
}

impl CancellationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a worker's token for `job_id`
    ///
    /// The returned guard marks the run as finished and unregisters it
    /// when dropped, on every exit path of the worker.
    pub fn register(self: &Arc<Self>, job_id: Uuid, token: CancellationToken) -> RunGuard {
        let (done_tx, done_rx) = watch::channel(false);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                job_id,
                RunEntry {
                    token,
                    done: done_rx,
                },
            );

        RunGuard {
            registry: Arc::clone(self),
            job_id,
            done: done_tx,
        }
    }

    /// Fires the token of `job_id`, returning a receiver that turns `true`
    /// once its worker has finished. `None` if no worker owns the job.
    pub fn signal(&self, job_id: Uuid) -> Option<watch::Receiver<bool>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.get(&job_id).map(|entry| {
            entry.token.cancel();
            entry.done.clone()
        })
    }

    /// Receivers for every run still registered
    pub fn pending_runs(&self) -> Vec<watch::Receiver<bool>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.done.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove(&self, job_id: Uuid) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_id);
    }
}

/// Held by a worker for as long as it owns a job
pub struct RunGuard {
    registry: Arc<CancellationRegistry>,
    job_id: Uuid,
    done: watch::Sender<bool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.remove(self.job_id);
        let _ = self.done.send(true);
    }
}

/// Waits until a worker reports its run finished, at most `timeout`
///
/// Returns false on timeout.
pub async fn wait_finished(mut done: watch::Receiver<bool>, timeout: Duration) -> bool {
    // A dropped sender also means the run is over
    let finished = async {
        let _ = done.wait_for(|finished| *finished).await;
    };
    tokio::time::timeout(timeout, finished).await.is_ok()
}

/// Cancellation controller
pub struct CancellationController {
    store: Arc<JobStore>,
    queue: Arc<JobQueue>,
    registry: Arc<CancellationRegistry>,
    /// Upper bound on how long `cancel` waits for a running job's worker.
    /// A job whose worker has not confirmed termination by then stays
    /// `running`; the worker records `cancelled` once the process is gone.
    wait_budget: Duration,
}

impl CancellationController {
    pub fn new(
        store: Arc<JobStore>,
        queue: Arc<JobQueue>,
        registry: Arc<CancellationRegistry>,
        wait_budget: Duration,
    ) -> Self {
        Self {
            store,
            queue,
            registry,
            wait_budget,
        }
    }

    /// Cancels a job
    ///
    /// Pending jobs are cancelled without ever being spawned. Running jobs
    /// are terminated (gracefully, then forcefully) and marked cancelled
    /// once their worker confirms the process is gone, unless they finished
    /// on their own in the meantime. Jobs already in a terminal state are
    /// left untouched.
    pub async fn cancel(&self, job_id: Uuid) -> Result<CancelOutcome> {
        let job = self.store.get(job_id)?;

        match job.status {
            JobStatus::Pending => self.cancel_pending(job_id).await,
            JobStatus::Running => self.cancel_running(job_id).await,
            terminal => Ok(already_finished(job_id, terminal)),
        }
    }

    async fn cancel_pending(&self, job_id: Uuid) -> Result<CancelOutcome> {
        self.queue.remove(job_id);

        match self
            .store
            .transition(job_id, JobStatus::Pending, Transition::Cancel)?
        {
            TransitionOutcome::Applied(status) => {
                info!("Job {} cancelled before start", job_id);
                Ok(outcome(job_id, status, "job cancelled before it started"))
            }
            TransitionOutcome::Lost {
                current: JobStatus::Running,
            } => {
                debug!("Job {} was claimed while cancelling, terminating it", job_id);
                self.cancel_running(job_id).await
            }
            TransitionOutcome::Lost { current } => Ok(already_finished(job_id, current)),
        }
    }

    async fn cancel_running(&self, job_id: Uuid) -> Result<CancelOutcome> {
        match self.registry.signal(job_id) {
            Some(done) => {
                if !wait_finished(done, self.wait_budget).await {
                    warn!(
                        "Worker for job {} did not confirm termination within {:?}",
                        job_id, self.wait_budget
                    );
                    let current = self.store.get(job_id)?.status;
                    if current == JobStatus::Running {
                        return Ok(outcome(
                            job_id,
                            current,
                            "cancellation requested; termination still in progress",
                        ));
                    }
                }
            }
            // The worker is already gone, so its process is too
            None => debug!("No worker registered for running job {}", job_id),
        }

        match self
            .store
            .transition(job_id, JobStatus::Running, Transition::Cancel)?
        {
            TransitionOutcome::Applied(status) => {
                info!("Job {} cancelled", job_id);
                Ok(outcome(job_id, status, "job cancelled"))
            }
            TransitionOutcome::Lost {
                current: JobStatus::Cancelled,
            } => {
                info!("Job {} cancelled", job_id);
                Ok(outcome(job_id, JobStatus::Cancelled, "job cancelled"))
            }
            TransitionOutcome::Lost { current } => {
                warn!(
                    "Job {} finished as {} before cancellation took effect",
                    job_id, current
                );
                Ok(already_finished(job_id, current))
            }
        }
    }
}

fn outcome(job_id: Uuid, status: JobStatus, message: &str) -> CancelOutcome {
    CancelOutcome {
        job_id,
        status,
        cancelled: status == JobStatus::Cancelled,
        message: message.to_string(),
    }
}

fn already_finished(job_id: Uuid, status: JobStatus) -> CancelOutcome {
    outcome(
        job_id,
        status,
        &format!("job already finished with status {}", status),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::args::JobArgs;
    use serde_json::json;

    type Parts = (Arc<JobStore>, Arc<JobQueue>, Arc<CancellationRegistry>, CancellationController);

    fn controller() -> Parts {
        controller_with_budget(Duration::from_secs(2))
    }

    fn controller_with_budget(wait_budget: Duration) -> Parts {
        let store = Arc::new(JobStore::new());
        let queue = Arc::new(JobQueue::new());
        let registry = Arc::new(CancellationRegistry::new());
        let controller = CancellationController::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&registry),
            wait_budget,
        );
        (store, queue, registry, controller)
    }

    #[test]
    fn test_guard_unregisters_on_drop() {
        let registry = Arc::new(CancellationRegistry::new());
        let id = Uuid::new_v4();
        let token = CancellationToken::new();

        let guard = registry.register(id, token.clone());
        assert_eq!(registry.len(), 1);

        let done = registry.signal(id).unwrap();
        assert!(token.is_cancelled());
        assert!(!*done.borrow());

        drop(guard);
        assert!(registry.is_empty());
        assert!(*done.borrow());
        assert!(registry.signal(id).is_none());
    }

    #[tokio::test]
    async fn test_cancel_pending_job_removes_it_from_queue() {
        let (store, queue, _, controller) = controller();
        let job = store.create("run.sh".into(), JobArgs::default(), None);
        queue.push(job.id);

        let outcome = controller.cancel(job.id).await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.status, JobStatus::Cancelled);
        assert!(queue.is_empty());
        assert!(store.get(job.id).unwrap().started_at.is_none());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_is_noop() {
        let (store, _, _, controller) = controller();
        let job = store.create("run.sh".into(), JobArgs::default(), None);
        store
            .transition(job.id, JobStatus::Pending, Transition::Start)
            .unwrap();
        store
            .transition(job.id, JobStatus::Running, Transition::Complete(json!(1)))
            .unwrap();

        let outcome = controller.cancel(job.id).await.unwrap();

        assert!(!outcome.cancelled);
        assert_eq!(outcome.status, JobStatus::Completed);
        assert_eq!(store.get(job.id).unwrap().result, Some(json!(1)));
    }

    #[tokio::test]
    async fn test_cancel_running_waits_for_worker() {
        let (store, _, registry, controller) = controller();
        let job = store.create("run.sh".into(), JobArgs::default(), None);
        let token = CancellationToken::new();
        let guard = registry.register(job.id, token.clone());
        store
            .transition(job.id, JobStatus::Pending, Transition::Start)
            .unwrap();

        // Simulated worker: stops when signalled, then releases its guard
        let worker_store = Arc::clone(&store);
        let worker = tokio::spawn(async move {
            token.cancelled().await;
            worker_store
                .transition(job.id, JobStatus::Running, Transition::Cancel)
                .unwrap();
            drop(guard);
        });

        let outcome = controller.cancel(job.id).await.unwrap();
        worker.await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cancel_running_loses_to_natural_completion() {
        let (store, _, registry, controller) = controller();
        let job = store.create("run.sh".into(), JobArgs::default(), None);
        let token = CancellationToken::new();
        let guard = registry.register(job.id, token);
        store
            .transition(job.id, JobStatus::Pending, Transition::Start)
            .unwrap();

        // Worker finalizes before it ever looks at the token
        let worker_store = Arc::clone(&store);
        let worker = tokio::spawn(async move {
            worker_store
                .transition(job.id, JobStatus::Running, Transition::Complete(json!({"count": 3})))
                .unwrap();
            drop(guard);
        });
        worker.await.unwrap();

        let outcome = controller.cancel(job.id).await.unwrap();
        assert!(!outcome.cancelled);
        assert_eq!(outcome.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_cancel_pending_claimed_mid_cancel_terminates_worker() {
        let (store, queue, registry, controller) = controller();
        let job = store.create("run.sh".into(), JobArgs::default(), None);
        queue.push(job.id);

        // A worker pops and claims the job after `cancel` saw it pending
        let token = CancellationToken::new();
        let guard = registry.register(job.id, token.clone());
        assert_eq!(queue.pop(), Some(job.id));
        store
            .transition(job.id, JobStatus::Pending, Transition::Start)
            .unwrap();

        let worker_store = Arc::clone(&store);
        let worker = tokio::spawn(async move {
            token.cancelled().await;
            worker_store
                .transition(job.id, JobStatus::Running, Transition::Cancel)
                .unwrap();
            drop(guard);
        });

        let outcome = controller.cancel_pending(job.id).await.unwrap();
        worker.await.unwrap();

        assert!(outcome.cancelled);
        assert_eq!(outcome.status, JobStatus::Cancelled);
        let job = store.get(job.id).unwrap();
        assert!(job.started_at.is_some());
        assert!(job.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_unconfirmed_termination_leaves_job_running() {
        let (store, _, registry, controller) = controller_with_budget(Duration::from_millis(100));
        let job = store.create("run.sh".into(), JobArgs::default(), None);
        let token = CancellationToken::new();
        let guard = registry.register(job.id, token.clone());
        store
            .transition(job.id, JobStatus::Pending, Transition::Start)
            .unwrap();

        // Worker never acknowledges the token within the budget
        let outcome = controller.cancel(job.id).await.unwrap();

        assert!(token.is_cancelled());
        assert!(!outcome.cancelled);
        assert_eq!(outcome.status, JobStatus::Running);
        assert!(outcome.message.contains("in progress"));
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Running);

        // Once the process is gone the worker records the cancellation
        store
            .transition(job.id, JobStatus::Running, Transition::Cancel)
            .unwrap();
        drop(guard);

        let again = controller.cancel(job.id).await.unwrap();
        assert_eq!(again.status, JobStatus::Cancelled);
        assert!(again.message.contains("already finished"));
    }

    #[tokio::test]
    async fn test_cancel_unknown_job() {
        let (_, _, _, controller) = controller();
        assert!(matches!(
            controller.cancel(Uuid::new_v4()).await,
            Err(crate::error::JobError::NotFound(_))
        ));
    }
}
