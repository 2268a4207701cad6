//! Job API Handlers
//!
//! HTTP endpoints for the background job lifecycle.

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use ferry_core::domain::job::{Job, JobStatus};
use ferry_core::dto::job::{
    CancelOutcome, JobList, JobResultView, JobStatusView, JobSubmitted, SubmitJob,
};
use ferry_core::dto::log::JobLog;
use ferry_engine::DEFAULT_LOG_TAIL;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::AppState;
use crate::api::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LogQuery {
    pub tail: Option<usize>,
}

/// POST /jobs
/// Submit a new background job
pub async fn submit_job(
    State(manager): State<AppState>,
    payload: Result<Json<SubmitJob>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<JobSubmitted>)> {
    let Json(req) = payload.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    tracing::debug!("Submitting job for script: {}", req.script_path);

    let submitted = manager.submit(req)?;
    Ok((StatusCode::ACCEPTED, Json(submitted)))
}

/// GET /jobs
/// List jobs in submission order
///
/// Query parameters:
/// - `status` (optional): Only jobs currently in this status
pub async fn list_jobs(
    State(manager): State<AppState>,
    query: Result<Query<ListJobsQuery>, QueryRejection>,
) -> ApiResult<Json<JobList>> {
    let Query(params) = query.map_err(bad_query)?;
    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::debug!("Listing jobs (status: {:?})", status);
    Ok(Json(manager.list_jobs(status)))
}

/// GET /jobs/{id}
/// Get the status of a job
pub async fn get_job_status(
    State(manager): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<JobStatusView>> {
    let Path(id) = path.map_err(bad_path)?;
    Ok(Json(manager.get_job_status(id)?))
}

/// GET /jobs/{id}/detail
/// Get the full job record
pub async fn get_job(
    State(manager): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<Job>> {
    let Path(id) = path.map_err(bad_path)?;
    Ok(Json(manager.get_job(id)?))
}

/// GET /jobs/{id}/result
/// Get the result of a completed job
pub async fn get_job_result(
    State(manager): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<JobResultView>> {
    let Path(id) = path.map_err(bad_path)?;
    Ok(Json(manager.get_job_result(id)?))
}

/// GET /jobs/{id}/log
/// Get the captured output of a job
///
/// Query parameters:
/// - `tail` (optional): Number of most recent lines, 0 for all (default 50)
pub async fn get_job_log(
    State(manager): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    query: Result<Query<LogQuery>, QueryRejection>,
) -> ApiResult<Json<JobLog>> {
    let Path(id) = path.map_err(bad_path)?;
    let Query(params) = query.map_err(bad_query)?;
    let tail = params.tail.unwrap_or(DEFAULT_LOG_TAIL);
    Ok(Json(manager.get_job_log(id, tail)?))
}

/// POST /jobs/{id}/cancel
/// Cancel a job; already finished jobs are reported, not rejected
pub async fn cancel_job(
    State(manager): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<Json<CancelOutcome>> {
    let Path(id) = path.map_err(bad_path)?;
    tracing::info!("Cancel requested for job {}", id);
    Ok(Json(manager.cancel_job(id).await?))
}

fn bad_path(rejection: PathRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

fn bad_query(rejection: QueryRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}
