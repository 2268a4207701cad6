//! API Module
//!
//! HTTP API layer over the job manager.

pub mod error;
pub mod health;
pub mod job;

use axum::{
    Router,
    routing::{get, post},
};
use ferry_engine::JobManager;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared handler state
pub type AppState = Arc<JobManager>;

/// Create the main API router with all endpoints
pub fn create_router(manager: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", post(job::submit_job).get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job_status))
        .route("/jobs/{id}/detail", get(job::get_job))
        .route("/jobs/{id}/result", get(job::get_job_result))
        .route("/jobs/{id}/log", get(job::get_job_log))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        // Add state and middleware
        .with_state(manager)
        .layer(TraceLayer::new_for_http())
}
