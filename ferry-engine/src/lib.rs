//! Background job engine
//!
//! Runs external task executors as supervised background processes: a
//! bounded worker pool fed in FIFO order, live log capture, results read
//! from the executor's output file and race-free cancellation.

pub mod config;
pub mod error;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use config::EngineConfig;
pub use error::{JobError, Result};
pub use service::{DEFAULT_LOG_TAIL, ExecutionOutcome, JobManager, LogSink, TaskExecutor};
