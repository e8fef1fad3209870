//! # Dispatch Queue
//!
//! Asynchronous task queue with a bounded worker pool plus a beat that
//! fires periodic maintenance tasks. The queue is an explicit, constructed
//! object passed by dependency injection, and the periodic schedule is
//! expressed as data (interval → task mapping) rather than process-global
//! registration.

pub mod queue;
pub mod schedule;

use thiserror::Error;

pub use queue::DispatchQueue;
pub use schedule::ScheduleEntry;

/// Errors from queue interaction
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Dispatch queue is closed")]
    QueueClosed,

    #[error("Dispatch worker failed: {0}")]
    WorkerFailed(String),
}
