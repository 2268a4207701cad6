//! FIFO dispatch queue of pending job ids

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use uuid::Uuid;

/// Queue of pending jobs in submission order
#[derive(Default)]
pub struct JobQueue {
    ids: Mutex<VecDeque<Uuid>>,
    notify: Notify,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a job and wakes the dispatcher
    pub fn push(&self, job_id: Uuid) {
        self.ids().push_back(job_id);
        self.notify.notify_one();
    }

    /// Takes the oldest queued job
    pub fn pop(&self) -> Option<Uuid> {
        self.ids().pop_front()
    }

    /// Removes a job from the queue, returning whether it was queued
    pub fn remove(&self, job_id: Uuid) -> bool {
        let mut ids = self.ids();
        match ids.iter().position(|id| *id == job_id) {
            Some(index) => ids.remove(index).is_some(),
            None => false,
        }
    }

    /// Resolves once something was pushed since the last wake-up
    pub async fn notified(&self) {
        self.notify.notified().await
    }

    pub fn len(&self) -> usize {
        self.ids().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ids(&self) -> MutexGuard<'_, VecDeque<Uuid>> {
        self.ids.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
