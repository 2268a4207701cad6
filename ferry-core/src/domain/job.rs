//! Job domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::args::JobArgs;

/// Job record
///
/// One record per submission. The engine owns the live copy; every reader
/// receives a clone so it never observes a record mutating mid-read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_name: Option<String>,
    pub script_path: String,
    pub args: JobArgs,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Present if and only if `status == Completed`
    pub result: Option<JsonValue>,
    /// Present if and only if `status == Failed`
    pub error: Option<String>,
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A state change requested on a job
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// `pending -> running`
    Start,
    /// `running -> completed` with the executor's result payload
    Complete(JsonValue),
    /// `running -> failed` with a description of what went wrong
    Fail(String),
    /// `pending | running -> cancelled`
    Cancel,
}

/// Returned when a transition is not allowed by the status machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal job transition from {from} to {to}")]
pub struct IllegalTransition {
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown job status '{0}' (expected pending, running, completed, failed or cancelled)")]
pub struct ParseStatusError(pub String);

impl JobStatus {
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Running,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Terminal states accept no further transitions
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Whether the status machine allows moving from `self` to `next`
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Pending, JobStatus::Cancelled)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Running, JobStatus::Failed)
                | (JobStatus::Running, JobStatus::Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        JobStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseStatusError(s.to_string()))
    }
}

impl Transition {
    /// The status this transition moves a job into
    pub fn target(&self) -> JobStatus {
        match self {
            Transition::Start => JobStatus::Running,
            Transition::Complete(_) => JobStatus::Completed,
            Transition::Fail(_) => JobStatus::Failed,
            Transition::Cancel => JobStatus::Cancelled,
        }
    }
}

impl Job {
    /// Creates a new pending job
    pub fn new(
        id: Uuid,
        script_path: String,
        args: JobArgs,
        job_name: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            job_name,
            script_path,
            args,
            status: JobStatus::Pending,
            created_at,
            started_at: None,
            finished_at: None,
            result: None,
            error: None,
        }
    }

    /// Applies a transition at time `at`
    ///
    /// This is the only place status, timestamps, result and error change.
    /// `started_at` is written by `Start`, `finished_at` by the terminal
    /// transitions; neither is ever overwritten because the status machine
    /// never re-enters the state that sets it.
    pub fn apply(
        &mut self,
        transition: Transition,
        at: DateTime<Utc>,
    ) -> Result<JobStatus, IllegalTransition> {
        let to = transition.target();
        if !self.status.can_transition_to(to) {
            return Err(IllegalTransition {
                from: self.status,
                to,
            });
        }

        // Clamp so created_at <= started_at <= finished_at holds even if the
        // wall clock steps backwards between transitions.
        let floor = self.started_at.unwrap_or(self.created_at);
        let at = at.max(floor);

        match transition {
            Transition::Start => self.started_at = Some(at),
            Transition::Complete(result) => {
                self.result = Some(result);
                self.finished_at = Some(at);
            }
            Transition::Fail(error) => {
                self.error = Some(error);
                self.finished_at = Some(at);
            }
            Transition::Cancel => self.finished_at = Some(at),
        }
        self.status = to;

        Ok(to)
    }
}
