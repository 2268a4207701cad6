//! In-memory job store
//!
//! Concurrency-safe registry of job records keyed by id. The id map is
//! only locked long enough to find a record; each record then has its own
//! lock for state and a separate lock for its log, so appending output
//! never blocks status readers and vice versa.

use chrono::Utc;
use ferry_core::domain::args::JobArgs;
use ferry_core::domain::job::{Job, JobStatus, Transition};
use ferry_core::domain::log::LogEntry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("job {0} not found")]
    NotFound(Uuid),

    #[error("job {job_id}: illegal transition from {from} to {to}")]
    IllegalTransition {
        job_id: Uuid,
        from: JobStatus,
        to: JobStatus,
    },
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Outcome of a compare-and-swap status transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The job was in the expected status and now has the new one
    Applied(JobStatus),
    /// Someone else moved the job first; nothing was changed
    Lost { current: JobStatus },
}

struct JobSlot {
    record: Mutex<Job>,
    log: RwLock<Vec<LogEntry>>,
}

#[derive(Default)]
struct Registry {
    slots: HashMap<Uuid, Arc<JobSlot>>,
    /// Ids in submission order
    order: Vec<Uuid>,
}

/// Concurrency-safe job registry
#[derive(Default)]
pub struct JobStore {
    registry: RwLock<Registry>,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new pending job and returns a snapshot of it
    pub fn create(&self, script_path: String, args: JobArgs, job_name: Option<String>) -> Job {
        let mut registry = write(&self.registry);

        let mut id = Uuid::new_v4();
        while registry.slots.contains_key(&id) {
            id = Uuid::new_v4();
        }

        // created_at is taken under the registry lock so submission order
        // and created_at order agree.
        let job = Job::new(id, script_path, args, job_name, Utc::now());

        registry.slots.insert(
            id,
            Arc::new(JobSlot {
                record: Mutex::new(job.clone()),
                log: RwLock::new(Vec::new()),
            }),
        );
        registry.order.push(id);

        debug!("Job {} stored ({} total)", id, registry.order.len());
        job
    }

    /// Returns an immutable copy of a job
    pub fn get(&self, id: Uuid) -> Result<Job> {
        let slot = self.slot(id)?;
        let job = lock(&slot.record).clone();
        Ok(job)
    }

    /// Applies `mutator` to a job atomically with respect to other
    /// mutators and readers of the same job
    pub fn update<R>(&self, id: Uuid, mutator: impl FnOnce(&mut Job) -> R) -> Result<R> {
        let slot = self.slot(id)?;
        let mut job = lock(&slot.record);
        Ok(mutator(&mut job))
    }

    /// Compare-and-swap status transition
    ///
    /// Applies `transition` only if the job is currently `expected`.
    /// A job found in another status is reported as a lost race, never
    /// an error; an illegal transition out of `expected` is a bug.
    pub fn transition(
        &self,
        id: Uuid,
        expected: JobStatus,
        transition: Transition,
    ) -> Result<TransitionOutcome> {
        self.update(id, |job| {
            if job.status != expected {
                return Ok(TransitionOutcome::Lost {
                    current: job.status,
                });
            }

            job.apply(transition, Utc::now())
                .map(TransitionOutcome::Applied)
                .map_err(|e| StoreError::IllegalTransition {
                    job_id: id,
                    from: e.from,
                    to: e.to,
                })
        })?
    }

    /// Appends one log line, returning the new line count
    pub fn append_log(&self, id: Uuid, entry: LogEntry) -> Result<usize> {
        let slot = self.slot(id)?;
        let mut log = write(&slot.log);
        log.push(entry);
        Ok(log.len())
    }

    /// Returns the last `tail` log lines (all of them when `tail == 0`)
    /// together with the total number captured so far
    pub fn log_tail(&self, id: Uuid, tail: usize) -> Result<(Vec<LogEntry>, usize)> {
        let slot = self.slot(id)?;
        let log = read(&slot.log);
        let total = log.len();
        let start = if tail == 0 { 0 } else { total.saturating_sub(tail) };
        Ok((log[start..].to_vec(), total))
    }

    /// Lists jobs in submission order, optionally filtered by status
    pub fn list(&self, status: Option<JobStatus>) -> Vec<Job> {
        let slots: Vec<Arc<JobSlot>> = {
            let registry = read(&self.registry);
            registry
                .order
                .iter()
                .filter_map(|id| registry.slots.get(id).cloned())
                .collect()
        };

        slots
            .iter()
            .map(|slot| lock(&slot.record).clone())
            .filter(|job| status.is_none_or(|wanted| job.status == wanted))
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.registry).order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, id: Uuid) -> Result<Arc<JobSlot>> {
        read(&self.registry)
            .slots
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }
}

// Poisoned guards are recovered: every critical section is a Job::apply
// call, a clone or a Vec push, none of which leaves a record half written.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_core::domain::log::LogStream;
    use serde_json::json;

    fn create(store: &JobStore, name: &str) -> Job {
        store.create(
            "scripts/run.sh".to_string(),
            JobArgs::default(),
            Some(name.to_string()),
        )
    }

    #[test]
    fn test_create_and_get() {
        let store = JobStore::new();
        let job = create(&store, "a");

        let fetched = store.get(job.id).unwrap();
        assert_eq!(fetched.id, job.id);
        assert_eq!(fetched.status, JobStatus::Pending);
        assert_eq!(fetched.job_name.as_deref(), Some("a"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_get_unknown_id() {
        let store = JobStore::new();
        assert!(matches!(
            store.get(Uuid::new_v4()),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_back_to_back_ids_are_distinct() {
        let store = JobStore::new();
        let ids: std::collections::HashSet<Uuid> =
            (0..500).map(|i| create(&store, &i.to_string()).id).collect();
        assert_eq!(ids.len(), 500);
    }

    #[test]
    fn test_snapshot_does_not_change_after_update() {
        let store = JobStore::new();
        let job = create(&store, "a");
        let snapshot = store.get(job.id).unwrap();

        store
            .transition(job.id, JobStatus::Pending, Transition::Start)
            .unwrap();

        assert_eq!(snapshot.status, JobStatus::Pending);
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Running);
    }

    #[test]
    fn test_transition_is_compare_and_swap() {
        let store = JobStore::new();
        let job = create(&store, "a");

        assert_eq!(
            store
                .transition(job.id, JobStatus::Pending, Transition::Cancel)
                .unwrap(),
            TransitionOutcome::Applied(JobStatus::Cancelled)
        );

        // The worker's claim loses against the cancellation
        assert_eq!(
            store
                .transition(job.id, JobStatus::Pending, Transition::Start)
                .unwrap(),
            TransitionOutcome::Lost {
                current: JobStatus::Cancelled
            }
        );
        assert!(store.get(job.id).unwrap().started_at.is_none());
    }

    #[test]
    fn test_finalize_and_cancel_race_has_one_winner() {
        let store = JobStore::new();
        let job = create(&store, "a");
        store
            .transition(job.id, JobStatus::Pending, Transition::Start)
            .unwrap();

        let first = store
            .transition(
                job.id,
                JobStatus::Running,
                Transition::Complete(json!({"count": 3})),
            )
            .unwrap();
        let second = store
            .transition(job.id, JobStatus::Running, Transition::Cancel)
            .unwrap();

        assert_eq!(first, TransitionOutcome::Applied(JobStatus::Completed));
        assert_eq!(
            second,
            TransitionOutcome::Lost {
                current: JobStatus::Completed
            }
        );
        let job = store.get(job.id).unwrap();
        assert_eq!(job.result, Some(json!({"count": 3})));
    }

    #[test]
    fn test_illegal_transition_from_expected_status() {
        let store = JobStore::new();
        let job = create(&store, "a");
        let err = store
            .transition(job.id, JobStatus::Pending, Transition::Fail("x".into()))
            .unwrap_err();
        assert!(matches!(err, StoreError::IllegalTransition { .. }));
        assert_eq!(store.get(job.id).unwrap().status, JobStatus::Pending);
    }

    #[test]
    fn test_log_tail() {
        let store = JobStore::new();
        let job = create(&store, "a");

        for i in 1..=3 {
            store
                .append_log(job.id, LogEntry::new(LogStream::Stdout, format!("line {}", i)))
                .unwrap();
        }

        let (lines, total) = store.log_tail(job.id, 5).unwrap();
        assert_eq!(total, 3);
        assert_eq!(lines.len(), 3);

        for i in 4..=8 {
            store
                .append_log(job.id, LogEntry::new(LogStream::Stderr, format!("line {}", i)))
                .unwrap();
        }

        let (lines, total) = store.log_tail(job.id, 5).unwrap();
        assert_eq!(total, 8);
        let messages: Vec<_> = lines.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, ["line 4", "line 5", "line 6", "line 7", "line 8"]);

        let (all, _) = store.log_tail(job.id, 0).unwrap();
        assert_eq!(all.len(), 8);
        assert_eq!(all[0].message, "line 1");
    }

    #[test]
    fn test_list_preserves_submission_order_and_filters() {
        let store = JobStore::new();
        let a = create(&store, "a");
        let b = create(&store, "b");
        let c = create(&store, "c");

        // Finish out of submission order
        for id in [c.id, a.id] {
            store
                .transition(id, JobStatus::Pending, Transition::Start)
                .unwrap();
            store
                .transition(id, JobStatus::Running, Transition::Complete(json!(null)))
                .unwrap();
        }

        let all: Vec<Uuid> = store.list(None).into_iter().map(|j| j.id).collect();
        assert_eq!(all, vec![a.id, b.id, c.id]);

        let completed: Vec<Uuid> = store
            .list(Some(JobStatus::Completed))
            .into_iter()
            .map(|j| j.id)
            .collect();
        assert_eq!(completed, vec![a.id, c.id]);

        let pending = store.list(Some(JobStatus::Pending));
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);
    }

    #[test]
    fn test_concurrent_appends_keep_every_line() {
        let store = Arc::new(JobStore::new());
        let job = create(&store, "a");

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..250 {
                        store
                            .append_log(
                                job.id,
                                LogEntry::new(LogStream::Stdout, format!("{}-{}", t, i)),
                            )
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.log_tail(job.id, 0).unwrap().1, 1000);
    }
}
