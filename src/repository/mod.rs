//! # Repository Layer
//!
//! Storage-technology-agnostic persistence for execution state. The
//! orchestrator, reaper, and health monitor talk to
//! [`OrchestratorRepository`]; job definitions come from the read-only
//! [`JobStore`]. Status-changing writes are conditional on the current
//! status so concurrent maintenance tasks cannot clobber a record that a
//! live coordinator just finished.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{ActionResult, ExecutionBranch, Job, JobExecution, TargetHealthState};
use crate::state_machine::{BranchState, ExecutionState, StateMachineError};

pub use memory::{InMemoryJobStore, InMemoryRepository};

/// Errors surfaced by repository implementations
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Record {0} not found")]
    NotFound(Uuid),

    #[error("Duplicate record {0}")]
    Duplicate(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

impl From<RepositoryError> for StateMachineError {
    fn from(error: RepositoryError) -> Self {
        StateMachineError::Persistence(error.to_string())
    }
}

/// Filter for execution listings, matched conjunctively
#[derive(Debug, Clone, Default)]
pub struct ExecutionFilter {
    pub job_id: Option<Uuid>,
    pub status: Option<ExecutionState>,
    pub limit: Option<usize>,
}

impl ExecutionFilter {
    pub fn for_job(job_id: Uuid) -> Self {
        Self {
            job_id: Some(job_id),
            ..Self::default()
        }
    }

    pub fn with_status(mut self, status: ExecutionState) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Persistence operations for executions, branches, action results, and
/// target health state
#[async_trait]
pub trait OrchestratorRepository: Send + Sync {
    /// Allocate the next execution number for a job
    ///
    /// The sequence is strictly increasing and gap-free under concurrent
    /// triggers.
    async fn next_execution_number(&self, job_id: Uuid) -> RepositoryResult<i64>;

    async fn insert_execution(&self, execution: JobExecution) -> RepositoryResult<()>;

    async fn fetch_execution(&self, execution_id: Uuid)
        -> RepositoryResult<Option<JobExecution>>;

    /// List executions matching the filter, newest first
    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> RepositoryResult<Vec<JobExecution>>;

    async fn running_execution_count(&self) -> RepositoryResult<usize>;

    /// Conditionally move an execution from `from` to `to`
    ///
    /// Sets `started_at` on entry to running and `completed_at` on entry to
    /// a terminal state. Returns false when the precondition no longer
    /// holds.
    async fn transition_execution(
        &self,
        execution_id: Uuid,
        from: ExecutionState,
        to: ExecutionState,
    ) -> RepositoryResult<bool>;

    /// Finalize a non-terminal execution with aggregate counters
    ///
    /// `to` must be terminal. Returns false when the execution already
    /// reached a terminal state.
    async fn finalize_execution(
        &self,
        execution_id: Uuid,
        to: ExecutionState,
        successful_targets: i32,
        failed_targets: i32,
        error_message: Option<String>,
    ) -> RepositoryResult<bool>;

    /// Update aggregate counters without touching status
    ///
    /// Used when branch outcomes arrive after the execution already reached
    /// a terminal state (a cancellation, for example), so the record still
    /// ends up with accurate totals.
    async fn update_execution_counters(
        &self,
        execution_id: Uuid,
        successful_targets: i32,
        failed_targets: i32,
    ) -> RepositoryResult<()>;

    async fn insert_branch(&self, branch: ExecutionBranch) -> RepositoryResult<()>;

    async fn fetch_branch(&self, branch_id: Uuid) -> RepositoryResult<Option<ExecutionBranch>>;

    /// Branches of one execution ordered by branch number
    async fn branches_for_execution(
        &self,
        execution_id: Uuid,
    ) -> RepositoryResult<Vec<ExecutionBranch>>;

    /// Conditionally move a branch from `from` to `to`
    ///
    /// Sets `started_at` on entry to running and `completed_at` on entry to
    /// a terminal state. Returns false when the precondition no longer
    /// holds.
    async fn transition_branch(
        &self,
        branch_id: Uuid,
        from: BranchState,
        to: BranchState,
    ) -> RepositoryResult<bool>;

    /// Count of branches currently in running status
    async fn running_branch_count(&self) -> RepositoryResult<usize>;

    /// Running branches whose `started_at` predates the cutoff (reaper scan)
    async fn running_branches_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ExecutionBranch>>;

    async fn insert_action_result(&self, result: ActionResult) -> RepositoryResult<()>;

    /// Replace a previously inserted attempt record (same `result_id`)
    async fn update_action_result(&self, result: ActionResult) -> RepositoryResult<()>;

    /// Results for one branch in insertion order
    async fn action_results_for_branch(
        &self,
        branch_id: Uuid,
    ) -> RepositoryResult<Vec<ActionResult>>;

    async fn upsert_health_state(&self, state: TargetHealthState) -> RepositoryResult<()>;

    async fn fetch_health_state(
        &self,
        target_id: Uuid,
    ) -> RepositoryResult<Option<TargetHealthState>>;

    /// Health records whose next probe is due
    async fn health_states_due(
        &self,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Vec<TargetHealthState>>;
}

/// Read-only view of the job-definition store
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn fetch_job(&self, job_id: Uuid) -> RepositoryResult<Option<Job>>;

    /// Non-deleted jobs carrying a recurrence rule
    async fn scheduled_jobs(&self) -> RepositoryResult<Vec<Job>>;
}
