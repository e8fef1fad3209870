//! # Execution Records
//!
//! One [`JobExecution`] per triggered run, one [`ExecutionBranch`] per
//! (execution, target) pair, one [`ActionResult`] per attempt at one
//! action. Executions are mutated only by the orchestrator and the reaper
//! and become immutable once terminal; each branch is owned by exactly one
//! coordinator while it runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::TriggerSource;
use crate::state_machine::{ActionState, BranchState, ExecutionState};

/// One triggered run of a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    pub execution_id: Uuid,
    pub job_id: Uuid,
    /// Monotonic, gap-free sequence per job
    pub execution_number: i64,
    pub status: ExecutionState,
    pub triggered_by: TriggerSource,
    pub scheduled_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    /// Set exactly when status is terminal
    pub completed_at: Option<DateTime<Utc>>,
    pub total_targets: i32,
    pub successful_targets: i32,
    pub failed_targets: i32,
    pub error_message: Option<String>,
}

impl JobExecution {
    pub fn new(
        job_id: Uuid,
        execution_number: i64,
        triggered_by: TriggerSource,
        total_targets: i32,
    ) -> Self {
        Self {
            execution_id: Uuid::new_v4(),
            job_id,
            execution_number,
            status: ExecutionState::Scheduled,
            triggered_by,
            scheduled_at: Utc::now(),
            started_at: None,
            completed_at: None,
            total_targets,
            successful_targets: 0,
            failed_targets: 0,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock duration from start to completion, when both are known
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.completed_at) {
            (Some(started), Some(completed)) => Some(completed - started),
            _ => None,
        }
    }
}

/// The per-target slice of one execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionBranch {
    pub branch_id: Uuid,
    pub execution_id: Uuid,
    pub target_id: Uuid,
    /// Ordinal position within the execution's fan-out, 1-based
    pub branch_number: i32,
    pub status: BranchState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ExecutionBranch {
    pub fn new(execution_id: Uuid, target_id: Uuid, branch_number: i32) -> Self {
        Self {
            branch_id: Uuid::new_v4(),
            execution_id,
            target_id,
            branch_number,
            status: BranchState::Scheduled,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// The recorded outcome of one attempt at one action
///
/// A retried action produces a new result row linked to the previous
/// attempt; history is never overwritten in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    pub result_id: Uuid,
    pub branch_id: Uuid,
    pub action_id: Uuid,
    /// Order index of the action within the job, 1-based
    pub order: i32,
    pub status: ActionState,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<String>,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    /// The command actually sent to the target, after parameter resolution
    pub executed_command: Option<String>,
    /// How many attempts preceded this one
    pub retry_count: u32,
    pub is_retry: bool,
    /// Result id of the attempt this one retries, if any
    pub previous_attempt: Option<Uuid>,
}

impl ActionResult {
    pub fn started(branch_id: Uuid, action_id: Uuid, order: i32) -> Self {
        Self {
            result_id: Uuid::new_v4(),
            branch_id,
            action_id,
            order,
            status: ActionState::Running,
            started_at: Utc::now(),
            completed_at: None,
            output: None,
            error: None,
            exit_code: None,
            executed_command: None,
            retry_count: 0,
            is_retry: false,
            previous_attempt: None,
        }
    }

    /// Mark this attempt as a retry of a previous one
    pub fn as_retry_of(mut self, previous: &ActionResult) -> Self {
        self.retry_count = previous.retry_count + 1;
        self.is_retry = true;
        self.previous_attempt = Some(previous.result_id);
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Finalize the attempt with a terminal status and timestamps
    pub fn finalize(
        &mut self,
        status: ActionState,
        output: Option<String>,
        error: Option<String>,
        exit_code: Option<i32>,
    ) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.output = output;
        self.error = error;
        self.exit_code = exit_code;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_execution_is_scheduled_without_timestamps() {
        let execution = JobExecution::new(Uuid::new_v4(), 1, TriggerSource::Manual, 3);
        assert_eq!(execution.status, ExecutionState::Scheduled);
        assert!(execution.started_at.is_none());
        assert!(execution.completed_at.is_none());
        assert_eq!(execution.total_targets, 3);
        assert!(!execution.is_terminal());
    }

    #[test]
    fn test_retry_linkage() {
        let branch_id = Uuid::new_v4();
        let action_id = Uuid::new_v4();
        let mut first = ActionResult::started(branch_id, action_id, 1);
        first.finalize(
            ActionState::Failed,
            None,
            Some("command timed out".to_string()),
            None,
        );

        let second = ActionResult::started(branch_id, action_id, 1).as_retry_of(&first);
        assert!(second.is_retry);
        assert_eq!(second.retry_count, 1);
        assert_eq!(second.previous_attempt, Some(first.result_id));
    }

    #[test]
    fn test_finalize_sets_completed_at() {
        let mut result = ActionResult::started(Uuid::new_v4(), Uuid::new_v4(), 1);
        assert!(!result.is_terminal());
        result.finalize(
            ActionState::Completed,
            Some("ok".to_string()),
            None,
            Some(0),
        );
        assert!(result.is_terminal());
        assert!(result.completed_at.is_some());
        assert_eq!(result.exit_code, Some(0));
    }
}
