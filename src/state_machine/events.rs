use serde::{Deserialize, Serialize};

/// Events that drive job execution state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Begin dispatching branches (scheduled → running)
    Start,
    /// All branches finished successfully (running → completed)
    Complete,
    /// At least one branch failed; payload carries the aggregate reason
    Fail(String),
    /// Operator or API requested cancellation
    Cancel,
}

impl ExecutionEvent {
    /// Event name used in published lifecycle events
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "execution.started",
            Self::Complete => "execution.completed",
            Self::Fail(_) => "execution.failed",
            Self::Cancel => "execution.cancelled",
        }
    }
}

/// Events that drive per-target branch state transitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchEvent {
    /// A coordinator claimed the branch (scheduled → running)
    Start,
    /// All actions succeeded (running → completed)
    Complete,
    /// An action failed; payload carries the first error message
    Fail(String),
    /// Cancellation observed at an action boundary
    Cancel,
    /// Runtime ceiling exceeded
    Timeout,
}

impl BranchEvent {
    /// Event name used in published lifecycle events
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "branch.started",
            Self::Complete => "branch.completed",
            Self::Fail(_) => "branch.failed",
            Self::Cancel => "branch.cancelled",
            Self::Timeout => "branch.timeout",
        }
    }
}
