//! Job DTOs for the public job API

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::domain::job::{Job, JobStatus};

/// Request to submit a new background job
///
/// `args` is left as raw JSON here; its shape is validated by the engine so
/// malformed mappings surface as validation errors instead of decode errors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitJob {
    pub script_path: String,
    #[serde(default)]
    pub args: JsonValue,
    #[serde(default)]
    pub job_name: Option<String>,
}

/// Response to a successful submission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSubmitted {
    pub job_id: Uuid,
    pub job_name: Option<String>,
    pub status: JobStatus,
}

/// Status snapshot of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatusView {
    pub job_id: Uuid,
    pub job_name: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl From<&Job> for JobStatusView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id,
            job_name: job.job_name.clone(),
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
            error: job.error.clone(),
        }
    }
}

/// Result payload of a completed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResultView {
    pub job_id: Uuid,
    pub result: JsonValue,
}

/// Job summary for listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSummary {
    pub job_id: Uuid,
    pub job_name: Option<String>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<Job> for JobSummary {
    fn from(job: Job) -> Self {
        Self {
            job_id: job.id,
            job_name: job.job_name,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            finished_at: job.finished_at,
        }
    }
}

/// Jobs in submission order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobList {
    pub jobs: Vec<JobSummary>,
    pub total: usize,
}

/// Outcome of a cancellation request
///
/// Cancelling a job that already finished is not an error: `cancelled` is
/// false and `status` carries the terminal status it finished with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub cancelled: bool,
    pub message: String,
}
