//! # Data Layer
//!
//! Job definitions, managed targets, execution records, and target health
//! state. Records carry their own invariant helpers; persistence lives
//! behind the [`crate::repository`] traits.

pub mod execution;
pub mod health;
pub mod job;
pub mod target;

pub use execution::{ActionResult, ExecutionBranch, JobExecution};
pub use health::TargetHealthState;
pub use job::{Action, ActionType, Job, RecurrenceRule, TriggerSource};
pub use target::{
    CommunicationMethod, ProtocolKind, StaticTargetRegistry, Target, TargetEnvironment,
    TargetRegistry,
};
