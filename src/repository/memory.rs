//! In-memory repository backed by concurrent maps
//!
//! Conditional writes take the map entry's shard lock for the duration of
//! the read-check-write, which gives the same effect as a row-level
//! compare-and-set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::{
    ExecutionFilter, JobStore, OrchestratorRepository, RepositoryError, RepositoryResult,
};
use crate::models::{ActionResult, ExecutionBranch, Job, JobExecution, TargetHealthState};
use crate::state_machine::{BranchState, ExecutionState};

/// In-memory implementation of [`OrchestratorRepository`]
#[derive(Debug, Default)]
pub struct InMemoryRepository {
    executions: DashMap<Uuid, JobExecution>,
    branches: DashMap<Uuid, ExecutionBranch>,
    /// Append-only attempt history per branch
    action_results: DashMap<Uuid, Vec<ActionResult>>,
    health: DashMap<Uuid, TargetHealthState>,
    execution_numbers: Mutex<HashMap<Uuid, i64>>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrchestratorRepository for InMemoryRepository {
    async fn next_execution_number(&self, job_id: Uuid) -> RepositoryResult<i64> {
        let mut numbers = self.execution_numbers.lock();
        let counter = numbers.entry(job_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_execution(&self, execution: JobExecution) -> RepositoryResult<()> {
        let execution_id = execution.execution_id;
        if self.executions.contains_key(&execution_id) {
            return Err(RepositoryError::Duplicate(execution_id));
        }
        self.executions.insert(execution_id, execution);
        Ok(())
    }

    async fn fetch_execution(
        &self,
        execution_id: Uuid,
    ) -> RepositoryResult<Option<JobExecution>> {
        Ok(self.executions.get(&execution_id).map(|e| e.clone()))
    }

    async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> RepositoryResult<Vec<JobExecution>> {
        let mut matches: Vec<JobExecution> = self
            .executions
            .iter()
            .filter(|entry| {
                filter.job_id.map_or(true, |job_id| entry.job_id == job_id)
                    && filter.status.map_or(true, |status| entry.status == status)
            })
            .map(|entry| entry.clone())
            .collect();
        matches.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
        if let Some(limit) = filter.limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    async fn running_execution_count(&self) -> RepositoryResult<usize> {
        Ok(self
            .executions
            .iter()
            .filter(|entry| entry.status.is_active())
            .count())
    }

    async fn transition_execution(
        &self,
        execution_id: Uuid,
        from: ExecutionState,
        to: ExecutionState,
    ) -> RepositoryResult<bool> {
        let mut entry = self
            .executions
            .get_mut(&execution_id)
            .ok_or(RepositoryError::NotFound(execution_id))?;
        if entry.status != from {
            return Ok(false);
        }
        entry.status = to;
        if to == ExecutionState::Running && entry.started_at.is_none() {
            entry.started_at = Some(Utc::now());
        }
        if to.is_terminal() && entry.completed_at.is_none() {
            entry.completed_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn finalize_execution(
        &self,
        execution_id: Uuid,
        to: ExecutionState,
        successful_targets: i32,
        failed_targets: i32,
        error_message: Option<String>,
    ) -> RepositoryResult<bool> {
        if !to.is_terminal() {
            return Err(RepositoryError::Storage(format!(
                "finalize_execution requires a terminal state, got {to}"
            )));
        }
        let mut entry = self
            .executions
            .get_mut(&execution_id)
            .ok_or(RepositoryError::NotFound(execution_id))?;
        if entry.status.is_terminal() {
            return Ok(false);
        }
        entry.status = to;
        entry.successful_targets = successful_targets;
        entry.failed_targets = failed_targets;
        entry.error_message = error_message;
        entry.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn update_execution_counters(
        &self,
        execution_id: Uuid,
        successful_targets: i32,
        failed_targets: i32,
    ) -> RepositoryResult<()> {
        let mut entry = self
            .executions
            .get_mut(&execution_id)
            .ok_or(RepositoryError::NotFound(execution_id))?;
        entry.successful_targets = successful_targets;
        entry.failed_targets = failed_targets;
        Ok(())
    }

    async fn insert_branch(&self, branch: ExecutionBranch) -> RepositoryResult<()> {
        let branch_id = branch.branch_id;
        if self.branches.contains_key(&branch_id) {
            return Err(RepositoryError::Duplicate(branch_id));
        }
        self.branches.insert(branch_id, branch);
        Ok(())
    }

    async fn fetch_branch(&self, branch_id: Uuid) -> RepositoryResult<Option<ExecutionBranch>> {
        Ok(self.branches.get(&branch_id).map(|b| b.clone()))
    }

    async fn branches_for_execution(
        &self,
        execution_id: Uuid,
    ) -> RepositoryResult<Vec<ExecutionBranch>> {
        let mut branches: Vec<ExecutionBranch> = self
            .branches
            .iter()
            .filter(|entry| entry.execution_id == execution_id)
            .map(|entry| entry.clone())
            .collect();
        branches.sort_by_key(|branch| branch.branch_number);
        Ok(branches)
    }

    async fn transition_branch(
        &self,
        branch_id: Uuid,
        from: BranchState,
        to: BranchState,
    ) -> RepositoryResult<bool> {
        let mut entry = self
            .branches
            .get_mut(&branch_id)
            .ok_or(RepositoryError::NotFound(branch_id))?;
        if entry.status != from {
            return Ok(false);
        }
        entry.status = to;
        if to == BranchState::Running && entry.started_at.is_none() {
            entry.started_at = Some(Utc::now());
        }
        if to.is_terminal() && entry.completed_at.is_none() {
            entry.completed_at = Some(Utc::now());
        }
        Ok(true)
    }

    async fn running_branch_count(&self) -> RepositoryResult<usize> {
        Ok(self
            .branches
            .iter()
            .filter(|entry| entry.status.is_active())
            .count())
    }

    async fn running_branches_started_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> RepositoryResult<Vec<ExecutionBranch>> {
        Ok(self
            .branches
            .iter()
            .filter(|entry| {
                entry.status.is_active()
                    && entry.started_at.is_some_and(|started| started < cutoff)
            })
            .map(|entry| entry.clone())
            .collect())
    }

    async fn insert_action_result(&self, result: ActionResult) -> RepositoryResult<()> {
        self.action_results
            .entry(result.branch_id)
            .or_default()
            .push(result);
        Ok(())
    }

    async fn update_action_result(&self, result: ActionResult) -> RepositoryResult<()> {
        let mut results = self
            .action_results
            .get_mut(&result.branch_id)
            .ok_or(RepositoryError::NotFound(result.result_id))?;
        let slot = results
            .iter_mut()
            .find(|existing| existing.result_id == result.result_id)
            .ok_or(RepositoryError::NotFound(result.result_id))?;
        *slot = result;
        Ok(())
    }

    async fn action_results_for_branch(
        &self,
        branch_id: Uuid,
    ) -> RepositoryResult<Vec<ActionResult>> {
        Ok(self
            .action_results
            .get(&branch_id)
            .map(|results| results.clone())
            .unwrap_or_default())
    }

    async fn upsert_health_state(&self, state: TargetHealthState) -> RepositoryResult<()> {
        self.health.insert(state.target_id, state);
        Ok(())
    }

    async fn fetch_health_state(
        &self,
        target_id: Uuid,
    ) -> RepositoryResult<Option<TargetHealthState>> {
        Ok(self.health.get(&target_id).map(|state| state.clone()))
    }

    async fn health_states_due(
        &self,
        now: DateTime<Utc>,
    ) -> RepositoryResult<Vec<TargetHealthState>> {
        let mut due: Vec<TargetHealthState> = self
            .health
            .iter()
            .filter(|entry| entry.is_due(now))
            .map(|entry| entry.clone())
            .collect();
        due.sort_by_key(|state| state.next_check_due_at);
        Ok(due)
    }
}

/// In-memory implementation of the read-only [`JobStore`]
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: DashMap<Uuid, Job>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: Job) {
        self.jobs.insert(job.job_id, job);
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn fetch_job(&self, job_id: Uuid) -> RepositoryResult<Option<Job>> {
        Ok(self.jobs.get(&job_id).map(|job| job.clone()))
    }

    async fn scheduled_jobs(&self) -> RepositoryResult<Vec<Job>> {
        Ok(self
            .jobs
            .iter()
            .filter(|entry| !entry.deleted && entry.schedule.is_some())
            .map(|entry| entry.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TriggerSource;

    #[tokio::test]
    async fn test_execution_number_sequence_is_gap_free() {
        let repository = InMemoryRepository::new();
        let job_id = Uuid::new_v4();

        for expected in 1..=5 {
            let number = repository.next_execution_number(job_id).await.unwrap();
            assert_eq!(number, expected);
        }

        // A different job gets its own sequence
        let other = repository
            .next_execution_number(Uuid::new_v4())
            .await
            .unwrap();
        assert_eq!(other, 1);
    }

    #[tokio::test]
    async fn test_transition_execution_cas_semantics() {
        let repository = InMemoryRepository::new();
        let execution = JobExecution::new(Uuid::new_v4(), 1, TriggerSource::Manual, 1);
        let execution_id = execution.execution_id;
        repository.insert_execution(execution).await.unwrap();

        let applied = repository
            .transition_execution(execution_id, ExecutionState::Scheduled, ExecutionState::Running)
            .await
            .unwrap();
        assert!(applied);

        // Stale precondition loses the race
        let stale = repository
            .transition_execution(execution_id, ExecutionState::Scheduled, ExecutionState::Running)
            .await
            .unwrap();
        assert!(!stale);

        let fetched = repository.fetch_execution(execution_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionState::Running);
        assert!(fetched.started_at.is_some());
        assert!(fetched.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_finalize_execution_is_a_noop_once_terminal() {
        let repository = InMemoryRepository::new();
        let execution = JobExecution::new(Uuid::new_v4(), 1, TriggerSource::Api, 2);
        let execution_id = execution.execution_id;
        repository.insert_execution(execution).await.unwrap();

        let first = repository
            .finalize_execution(execution_id, ExecutionState::Failed, 1, 1, None)
            .await
            .unwrap();
        assert!(first);

        let second = repository
            .finalize_execution(execution_id, ExecutionState::Completed, 2, 0, None)
            .await
            .unwrap();
        assert!(!second);

        let fetched = repository.fetch_execution(execution_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, ExecutionState::Failed);
        assert_eq!(fetched.successful_targets + fetched.failed_targets, 2);
        assert!(fetched.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_list_executions_filters_and_orders_newest_first() {
        let repository = InMemoryRepository::new();
        let job_id = Uuid::new_v4();

        for number in 1..=3 {
            let mut execution = JobExecution::new(job_id, number, TriggerSource::Schedule, 1);
            execution.scheduled_at = Utc::now() - chrono::Duration::minutes(10 - number);
            repository.insert_execution(execution).await.unwrap();
        }
        repository
            .insert_execution(JobExecution::new(Uuid::new_v4(), 1, TriggerSource::Manual, 1))
            .await
            .unwrap();

        let listed = repository
            .list_executions(&ExecutionFilter::for_job(job_id).with_limit(2))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].scheduled_at >= listed[1].scheduled_at);
        assert_eq!(listed[0].execution_number, 3);
    }

    #[tokio::test]
    async fn test_stale_branch_scan_honors_cutoff() {
        let repository = InMemoryRepository::new();
        let execution_id = Uuid::new_v4();

        let fresh = ExecutionBranch::new(execution_id, Uuid::new_v4(), 1);
        let fresh_id = fresh.branch_id;
        repository.insert_branch(fresh).await.unwrap();
        repository
            .transition_branch(fresh_id, BranchState::Scheduled, BranchState::Running)
            .await
            .unwrap();

        let cutoff = Utc::now() - chrono::Duration::hours(24);
        let stale = repository
            .running_branches_started_before(cutoff)
            .await
            .unwrap();
        assert!(stale.is_empty());

        let all_running = repository
            .running_branches_started_before(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(all_running.len(), 1);
    }
}
