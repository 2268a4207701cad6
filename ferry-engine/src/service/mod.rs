//! Service layer: job API, executor adapter, log capture and cancellation

pub mod cancellation;
pub mod executor;
pub mod jobs;
pub mod log_capture;

pub use executor::{ExecutionOutcome, Invocation, ProcessExecutor, TaskExecutor};
pub use jobs::{DEFAULT_LOG_TAIL, JobManager};
pub use log_capture::LogSink;
