//! Repository layer
//!
//! Holds the engine's only shared structure: the job store. Workers, the
//! dispatcher and the cancellation controller coordinate through it rather
//! than through references to one another.

mod job_store;

pub use job_store::{JobStore, StoreError, TransitionOutcome};
