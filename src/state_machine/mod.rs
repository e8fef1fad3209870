// State machine module for job execution orchestration
//
// Execution, branch, action-attempt, and target-health states with the
// transition rules that keep them monotonic, plus repository-backed
// machines that persist transitions behind a status precondition.

pub mod branch_state_machine;
pub mod errors;
pub mod events;
pub mod execution_state_machine;
pub mod states;

// Re-export main types for convenient access
pub use branch_state_machine::BranchStateMachine;
pub use errors::{StateMachineError, StateMachineResult};
pub use events::{BranchEvent, ExecutionEvent};
pub use execution_state_machine::ExecutionStateMachine;
pub use states::{ActionState, BranchState, ExecutionState, HealthStatus};
