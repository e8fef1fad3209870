use serde::{Deserialize, Serialize};
use std::fmt;

/// Execution state definitions for one triggered run of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionState {
    /// Initial state when the execution record is created
    Scheduled,
    /// Branches are being dispatched and executed
    Running,
    /// Every branch completed successfully
    Completed,
    /// At least one branch failed
    Failed,
    /// Execution was cancelled by an operator or the API
    Cancelled,
}

impl ExecutionState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if this is an active state (branches may still be in flight)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }
}

impl fmt::Display for ExecutionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ExecutionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid execution state: {s}")),
        }
    }
}

impl Default for ExecutionState {
    fn default() -> Self {
        Self::Scheduled
    }
}

/// Branch state definitions for the per-target slice of one execution
///
/// Branch status is monotonically non-decreasing through
/// scheduled → running → terminal; there is no transition out of a
/// terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchState {
    /// Branch record exists but no worker has picked it up yet
    Scheduled,
    /// A branch coordinator owns this branch and is running actions
    Running,
    /// All actions completed successfully
    Completed,
    /// At least one action failed
    Failed,
    /// Branch observed execution cancellation at an action boundary
    Cancelled,
    /// Branch exceeded its overall runtime ceiling
    Timeout,
}

impl BranchState {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }

    /// Check if this is an active state (a coordinator owns the branch)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running)
    }

    /// Check if this branch counts toward the successful-target aggregate
    pub fn is_successful(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for BranchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scheduled => write!(f, "scheduled"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

impl std::str::FromStr for BranchState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            _ => Err(format!("Invalid branch state: {s}")),
        }
    }
}

impl Default for BranchState {
    fn default() -> Self {
        Self::Scheduled
    }
}

/// Action attempt state for one recorded attempt at one job step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionState {
    /// Attempt is currently executing
    Running,
    /// Attempt finished with a zero exit code
    Completed,
    /// Attempt finished with an error, timeout, or non-zero exit code
    Failed,
    /// Attempt was skipped by a conditional action short-circuit
    Skipped,
    /// Attempt observed execution cancellation before dispatch
    Cancelled,
}

impl ActionState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for ActionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for ActionState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "skipped" => Ok(Self::Skipped),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid action state: {s}")),
        }
    }
}

/// Rolling health classification for one managed target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// No probe has completed yet
    Unknown,
    /// Target responds within the warning latency bound
    Healthy,
    /// Consecutive failures or latency crossed the warning threshold
    Warning,
    /// Consecutive failures or latency crossed the critical threshold
    Critical,
}

impl HealthStatus {
    /// Check if the target is degraded enough to deserve faster probing
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Healthy => write!(f, "healthy"),
            Self::Warning => write!(f, "warning"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for HealthStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "healthy" => Ok(Self::Healthy),
            "warning" => Ok(Self::Warning),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Invalid health status: {s}")),
        }
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Unknown
    }
}
