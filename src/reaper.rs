//! # Stale Execution Reaper
//!
//! Maintenance sweep that recovers branches whose coordinator died without
//! landing a terminal state. A branch running longer than the configured
//! ceiling is conditionally failed, gets a synthesized recovery result so
//! the history explains what happened, and its execution is finalized once
//! every branch has reached a terminal state.
//!
//! Every write is a compare-and-set against the running status, so a sweep
//! that races a live coordinator (or a second sweep) is a no-op.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ReaperConfig;
use crate::events::publisher::EventPublisher;
use crate::logging::log_branch_operation;
use crate::models::{ActionResult, ExecutionBranch};
use crate::repository::{OrchestratorRepository, RepositoryResult};
use crate::state_machine::{ActionState, BranchState, ExecutionState};

const RECOVERY_MESSAGE: &str = "stuck before any action completed, recovered by maintenance sweep";

/// What one sweep found and did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaperReport {
    /// Running branches older than the cutoff
    pub scanned: usize,
    /// Branches this sweep moved to failed
    pub reaped_branches: usize,
    /// Executions this sweep finalized
    pub finalized_executions: usize,
}

pub struct StaleExecutionReaper {
    repository: Arc<dyn OrchestratorRepository>,
    event_publisher: EventPublisher,
    config: ReaperConfig,
}

impl StaleExecutionReaper {
    pub fn new(
        repository: Arc<dyn OrchestratorRepository>,
        event_publisher: EventPublisher,
        config: ReaperConfig,
    ) -> Self {
        Self {
            repository,
            event_publisher,
            config,
        }
    }

    /// Run one sweep against the current clock
    pub async fn sweep(&self) -> RepositoryResult<ReaperReport> {
        self.sweep_at(Utc::now()).await
    }

    /// Run one sweep with an explicit notion of "now"
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> RepositoryResult<ReaperReport> {
        let cutoff = now - Duration::hours(self.config.stale_runtime_hours);
        let stale = self.repository.running_branches_started_before(cutoff).await?;

        let mut report = ReaperReport {
            scanned: stale.len(),
            ..ReaperReport::default()
        };
        let mut touched_executions: Vec<Uuid> = Vec::new();

        for branch in stale {
            let claimed = self
                .repository
                .transition_branch(branch.branch_id, BranchState::Running, BranchState::Failed)
                .await?;
            if !claimed {
                // A coordinator (or another sweep) finished the branch first
                continue;
            }

            self.record_recovery(&branch).await?;
            report.reaped_branches += 1;
            if !touched_executions.contains(&branch.execution_id) {
                touched_executions.push(branch.execution_id);
            }

            log_branch_operation(
                "branch_reaped",
                Some(branch.execution_id),
                Some(branch.branch_id),
                None,
                "failed",
                Some(RECOVERY_MESSAGE),
            );
            self.event_publisher
                .publish(
                    "branch.reaped",
                    serde_json::json!({
                        "branch_id": branch.branch_id,
                        "execution_id": branch.execution_id,
                        "started_at": branch.started_at,
                    }),
                )
                .await
                .ok();
        }

        for execution_id in touched_executions {
            if self.finalize_if_settled(execution_id).await? {
                report.finalized_executions += 1;
            }
        }

        if report.reaped_branches > 0 {
            info!(
                scanned = report.scanned,
                reaped = report.reaped_branches,
                finalized = report.finalized_executions,
                "Reaper sweep recovered stale work"
            );
        }
        Ok(report)
    }

    /// Leave an explanation in the branch's attempt history
    ///
    /// A dangling running attempt is finalized in place; a branch with no
    /// open attempt gets a synthesized record.
    async fn record_recovery(&self, branch: &ExecutionBranch) -> RepositoryResult<()> {
        let results = self
            .repository
            .action_results_for_branch(branch.branch_id)
            .await?;

        if let Some(open) = results.iter().rev().find(|result| !result.is_terminal()) {
            let mut recovered = open.clone();
            recovered.finalize(
                ActionState::Failed,
                None,
                Some(RECOVERY_MESSAGE.to_string()),
                None,
            );
            return self.repository.update_action_result(recovered).await;
        }

        let next_order = results.iter().map(|result| result.order).max().unwrap_or(0) + 1;
        let mut synthesized = ActionResult::started(branch.branch_id, Uuid::nil(), next_order);
        synthesized.finalize(
            ActionState::Failed,
            None,
            Some(RECOVERY_MESSAGE.to_string()),
            None,
        );
        self.repository.insert_action_result(synthesized).await
    }

    /// Finalize the execution once every branch is terminal
    async fn finalize_if_settled(&self, execution_id: Uuid) -> RepositoryResult<bool> {
        let branches = self.repository.branches_for_execution(execution_id).await?;
        if branches.iter().any(|branch| !branch.is_terminal()) {
            return Ok(false);
        }

        let successful = branches
            .iter()
            .filter(|branch| branch.status.is_successful())
            .count();
        let failed = branches.len() - successful;

        let finalized = self
            .repository
            .finalize_execution(
                execution_id,
                ExecutionState::Failed,
                i32::try_from(successful).unwrap_or(i32::MAX),
                i32::try_from(failed).unwrap_or(i32::MAX),
                Some(RECOVERY_MESSAGE.to_string()),
            )
            .await?;
        if !finalized {
            warn!(
                execution_id = %execution_id,
                "Execution already terminal during reaper finalize"
            );
        }
        Ok(finalized)
    }
}
