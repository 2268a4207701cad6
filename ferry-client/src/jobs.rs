//! Job-related API endpoints

use ferry_core::domain::job::{Job, JobStatus};
use ferry_core::dto::job::{
    CancelOutcome, JobList, JobResultView, JobStatusView, JobSubmitted, SubmitJob,
};
use ferry_core::dto::log::JobLog;
use std::time::Duration;
use uuid::Uuid;

use crate::FerryClient;
use crate::error::{ClientError, Result};

impl FerryClient {
    /// Check that the server is up
    pub async fn health(&self) -> Result<()> {
        let response = self.client.get(self.url("/health")).send().await?;
        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Job Lifecycle
    // =============================================================================

    /// Submit a new background job
    ///
    /// # Arguments
    /// * `req` - Script path, argument mapping and optional name
    ///
    /// # Returns
    /// The id of the queued job
    pub async fn submit_job(&self, req: &SubmitJob) -> Result<JobSubmitted> {
        if req.script_path.trim().is_empty() {
            return Err(ClientError::InvalidRequest(
                "script_path cannot be empty".to_string(),
            ));
        }

        let response = self.client.post(self.url("/jobs")).json(req).send().await?;
        self.handle_response(response).await
    }

    /// Get the status of a job
    pub async fn get_job_status(&self, job_id: Uuid) -> Result<JobStatusView> {
        let url = self.url(&format!("/jobs/{}", job_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the full record of a job
    pub async fn get_job(&self, job_id: Uuid) -> Result<Job> {
        let url = self.url(&format!("/jobs/{}/detail", job_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the result of a completed job
    ///
    /// Fails with a `not_ready` API error while the job is still running, and
    /// with a 404 carrying the job's error when it failed or was cancelled.
    pub async fn get_job_result(&self, job_id: Uuid) -> Result<JobResultView> {
        let url = self.url(&format!("/jobs/{}/result", job_id));
        let response = self.client.get(&url).send().await?;

        self.handle_response(response).await
    }

    /// Get the captured output of a job
    ///
    /// # Arguments
    /// * `job_id` - The job UUID
    /// * `tail` - Number of most recent lines (`Some(0)` for all, `None` for
    ///   the server default)
    pub async fn get_job_log(&self, job_id: Uuid, tail: Option<usize>) -> Result<JobLog> {
        let url = self.url(&format!("/jobs/{}/log", job_id));
        let mut request = self.client.get(&url);
        if let Some(tail) = tail {
            request = request.query(&[("tail", tail)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Cancel a job
    ///
    /// Cancelling a finished job is not an error; the outcome reports the
    /// status it finished with.
    pub async fn cancel_job(&self, job_id: Uuid) -> Result<CancelOutcome> {
        let url = self.url(&format!("/jobs/{}/cancel", job_id));
        let response = self.client.post(&url).send().await?;

        self.handle_response(response).await
    }

    /// List jobs in submission order, optionally filtered by status
    pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<JobList> {
        let mut request = self.client.get(self.url("/jobs"));
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Poll a job until it reaches a terminal status
    pub async fn wait_for_job(&self, job_id: Uuid, poll_interval: Duration) -> Result<JobStatusView> {
        loop {
            let status = self.get_job_status(job_id).await?;
            if status.status.is_terminal() {
                return Ok(status);
            }

            tracing::debug!("Job {} is {}, polling again", job_id, status.status);
            tokio::time::sleep(poll_interval).await;
        }
    }
}
