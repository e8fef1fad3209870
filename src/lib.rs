//! # FleetOps Core
//!
//! Job orchestration and execution engine for fleets of managed targets.
//! A job is an ordered sequence of actions run against a set of targets;
//! triggering one produces an execution with one branch per target, each
//! branch recording a per-attempt result history as its actions run.
//!
//! ## Key Features
//! - **Explicit state machines**: execution, branch, and action-attempt
//!   states with monotonic, compare-and-set persisted transitions
//! - **Bounded concurrent fan-out**: a system-wide cap on running branches
//!   with per-attempt connection and command timeouts
//! - **Retry with exponential backoff** for transient connection failures,
//!   every attempt kept in the history
//! - **Stale-execution reaper** that recovers work orphaned by dead
//!   coordinators
//! - **Target health monitoring** with failure/recovery hysteresis and
//!   per-environment probe cadence
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fleetops_core::config::FleetConfig;
//! use fleetops_core::credentials::StaticCredentialResolver;
//! use fleetops_core::models::{StaticTargetRegistry, TriggerSource};
//! use fleetops_core::orchestration::OrchestrationSystem;
//! use fleetops_core::repository::{InMemoryJobStore, InMemoryRepository};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let system = OrchestrationSystem::bootstrap(
//!     FleetConfig::load()?,
//!     Arc::new(InMemoryRepository::new()),
//!     Arc::new(InMemoryJobStore::new()),
//!     Arc::new(StaticTargetRegistry::new()),
//!     Arc::new(StaticCredentialResolver::new()),
//! )?;
//! system.start();
//!
//! let job_id = uuid::Uuid::new_v4();
//! let execution_id = system
//!     .orchestrator()
//!     .start_execution(job_id, TriggerSource::Manual, None)
//!     .await?;
//! println!("triggered {execution_id}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod health;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod reaper;
pub mod repository;
pub mod state_machine;

pub use config::FleetConfig;
pub use error::{FleetError, FleetResult};
pub use events::EventPublisher;
pub use health::TargetHealthMonitor;
pub use orchestration::{OrchestrationSystem, Orchestrator};
pub use reaper::StaleExecutionReaper;
pub use state_machine::{ActionState, BranchState, ExecutionState, HealthStatus};
