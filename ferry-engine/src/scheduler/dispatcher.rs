//! Job dispatcher
//!
//! Hands queued jobs to workers, oldest first, with at most `max_workers`
//! running at a time. Each job runs in its own task holding a semaphore
//! permit for its whole lifetime.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::scheduler::queue::JobQueue;
use crate::scheduler::worker::Worker;

/// Dispatcher that continuously feeds queued jobs to workers
pub struct Dispatcher {
    queue: Arc<JobQueue>,
    worker: Arc<Worker>,
    semaphore: Arc<Semaphore>,
    max_workers: usize,
    shutdown: CancellationToken,
}

impl Dispatcher {
    /// Creates a new dispatcher
    ///
    /// Cancelling `shutdown` stops dispatching and cancels every job a
    /// worker currently owns.
    pub fn new(
        queue: Arc<JobQueue>,
        worker: Arc<Worker>,
        max_workers: usize,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            queue,
            worker,
            semaphore: Arc::new(Semaphore::new(max_workers)),
            max_workers,
            shutdown,
        }
    }

    /// Spawns the dispatch loop onto the runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs the dispatch loop until shutdown
    pub async fn run(self) {
        info!("Starting job dispatcher ({} workers)", self.max_workers);

        loop {
            let permit = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                permit = Arc::clone(&self.semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let job_id = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                job_id = self.next_job() => job_id,
            };

            debug!(
                "Dispatching job {} ({} still queued)",
                job_id,
                self.queue.len()
            );
            self.spawn_job_task(job_id, permit);
        }

        info!("Job dispatcher stopped");
    }

    async fn next_job(&self) -> Uuid {
        loop {
            if let Some(job_id) = self.queue.pop() {
                return job_id;
            }
            self.queue.notified().await;
        }
    }

    /// Spawns a task to execute a single job
    fn spawn_job_task(&self, job_id: Uuid, permit: OwnedSemaphorePermit) -> JoinHandle<()> {
        let worker = Arc::clone(&self.worker);
        let token = self.shutdown.child_token();

        tokio::spawn(async move {
            worker.run(job_id, token).await;
            // Slot is released for the next job
            drop(permit);
        })
    }
}
