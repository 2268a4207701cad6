//! Job scheduling: FIFO queue, dispatcher and workers

mod dispatcher;
mod queue;
mod worker;

pub use dispatcher::Dispatcher;
pub use queue::JobQueue;
pub use worker::Worker;
