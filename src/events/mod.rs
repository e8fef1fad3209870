//! # Lifecycle Events
//!
//! Broadcast-based event publishing for execution, branch, and health
//! lifecycle transitions. Subscribing is optional; publishing is
//! best-effort and never blocks orchestration.

pub mod publisher;

pub use publisher::{EventPublisher, PublishError, PublishedEvent};
