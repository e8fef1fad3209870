//! # Orchestration Core
//!
//! Execution lifecycle from trigger to terminal aggregate: validation and
//! fan-out in the [`orchestrator`], one [`branch_coordinator`] per target,
//! the [`action_runner`] doing the per-action work, and the
//! [`system`] bootstrap that wires the engine together.
//!
//! ## Key Features
//! - Fail-fast triggers: rejected requests leave no records
//! - Branch fan-out bounded by a system-wide concurrency cap
//! - Per-attempt result history with retry linkage
//! - Cooperative cancellation at action boundaries

pub mod action_runner;
pub mod branch_coordinator;
pub mod errors;
pub mod orchestrator;
pub mod system;
pub mod types;

pub use action_runner::{ActionRunner, ActionsOutcome};
pub use branch_coordinator::BranchCoordinator;
pub use errors::{OrchestrationError, OrchestrationResult};
pub use orchestrator::Orchestrator;
pub use system::OrchestrationSystem;
pub use types::{BranchDetail, BranchOutcome, CancellationFlag, ExecutionDetail};
