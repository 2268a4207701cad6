//! Error types for the job engine

use ferry_core::domain::args::ArgsError;
use ferry_core::domain::job::JobStatus;
use ferry_core::dto::error::{ErrorBody, ErrorKind};
use thiserror::Error;
use uuid::Uuid;

use crate::repository::StoreError;

/// Result type alias for job API operations
pub type Result<T> = std::result::Result<T, JobError>;

/// Errors raised synchronously by the public job API
///
/// Execution failures are not in here: a job whose process fails is
/// recorded as `failed` and observed through status/result queries.
#[derive(Debug, Error)]
pub enum JobError {
    /// Malformed submission, rejected before anything is spawned
    #[error("invalid job submission: {0}")]
    Validation(String),

    /// Unknown job id
    #[error("job {0} not found")]
    NotFound(Uuid),

    /// Result requested from a job that failed or was cancelled
    #[error("job {job_id} has no result ({status}): {message}")]
    NoResult {
        job_id: Uuid,
        status: JobStatus,
        message: String,
    },

    /// Result requested before the job reached a terminal state
    #[error("job {job_id} has not finished yet (status: {status})")]
    NotReady { job_id: Uuid, status: JobStatus },

    /// The engine no longer accepts work
    #[error("job engine is shutting down")]
    ShuttingDown,

    #[error("internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// The error category exposed to API callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            JobError::Validation(_) => ErrorKind::Validation,
            JobError::NotFound(_) | JobError::NoResult { .. } => ErrorKind::NotFound,
            JobError::NotReady { .. } => ErrorKind::NotReady,
            JobError::ShuttingDown | JobError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody::new(self.kind(), self.to_string())
    }
}

impl From<ArgsError> for JobError {
    fn from(err: ArgsError) -> Self {
        JobError::Validation(err.to_string())
    }
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => JobError::NotFound(id),
            StoreError::IllegalTransition { .. } => JobError::Internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let id = Uuid::new_v4();
        assert_eq!(
            JobError::Validation("bad".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(JobError::NotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(
            JobError::NoResult {
                job_id: id,
                status: JobStatus::Failed,
                message: "exit code 1".into(),
            }
            .kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            JobError::NotReady {
                job_id: id,
                status: JobStatus::Running,
            }
            .kind(),
            ErrorKind::NotReady
        );
        assert_eq!(JobError::ShuttingDown.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_no_result_surfaces_stored_error() {
        let err = JobError::NoResult {
            job_id: Uuid::nil(),
            status: JobStatus::Failed,
            message: "exit code 1".into(),
        };
        let body = err.to_body();
        assert!(body.message.contains("exit code 1"));
        assert!(body.message.contains("failed"));
    }
}
