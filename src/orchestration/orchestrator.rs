//! # Orchestrator
//!
//! Entry point for triggering, cancelling, and inspecting executions.
//! A trigger validates the job, creates the execution and branch records,
//! then fans branches out through the dispatch queue; a per-execution
//! supervisor collects branch outcomes and finalizes the aggregate record.
//!
//! ## Key Features
//! - Fail-fast validation: a rejected trigger leaves no records behind
//! - System-wide branch concurrency cap via a semaphore acquired before a
//!   branch is claimed
//! - Cooperative cancellation observed at action boundaries
//! - Scheduler pass that triggers recurring jobs when they come due

use chrono::{Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tracing::{info, warn};
use uuid::Uuid;

use super::branch_coordinator::BranchCoordinator;
use super::errors::{OrchestrationError, OrchestrationResult};
use super::types::{BranchDetail, BranchOutcome, CancellationFlag, ExecutionDetail};
use crate::config::ExecutionConfig;
use crate::dispatch::DispatchQueue;
use crate::events::publisher::EventPublisher;
use crate::logging::log_execution_operation;
use crate::models::{
    ExecutionBranch, Job, JobExecution, Target, TargetHealthState, TargetRegistry, TriggerSource,
};
use crate::repository::{ExecutionFilter, JobStore, OrchestratorRepository};
use crate::state_machine::{
    BranchState, ExecutionEvent, ExecutionState, ExecutionStateMachine, HealthStatus,
};

pub struct Orchestrator {
    execution_config: ExecutionConfig,
    repository: Arc<dyn OrchestratorRepository>,
    job_store: Arc<dyn JobStore>,
    target_registry: Arc<dyn TargetRegistry>,
    coordinator: Arc<BranchCoordinator>,
    queue: Arc<DispatchQueue>,
    event_publisher: EventPublisher,
    branch_permits: Arc<Semaphore>,
    cancellations: Arc<DashMap<Uuid, CancellationFlag>>,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        execution_config: ExecutionConfig,
        repository: Arc<dyn OrchestratorRepository>,
        job_store: Arc<dyn JobStore>,
        target_registry: Arc<dyn TargetRegistry>,
        coordinator: Arc<BranchCoordinator>,
        queue: Arc<DispatchQueue>,
        event_publisher: EventPublisher,
    ) -> Self {
        let branch_permits = Arc::new(Semaphore::new(execution_config.max_concurrent_targets));
        Self {
            execution_config,
            repository,
            job_store,
            target_registry,
            coordinator,
            queue,
            event_publisher,
            branch_permits,
            cancellations: Arc::new(DashMap::new()),
        }
    }

    /// Trigger one execution of a job
    ///
    /// Validation, confirmation, and the running-execution ceiling are all
    /// checked before any record is created. Returns the new execution id
    /// once branches are queued; completion is observed through
    /// [`Orchestrator::get_execution_status`] or the event stream.
    pub async fn start_execution(
        &self,
        job_id: Uuid,
        triggered_by: TriggerSource,
        confirmation_token: Option<&str>,
    ) -> OrchestrationResult<Uuid> {
        let job = self
            .job_store
            .fetch_job(job_id)
            .await?
            .ok_or(OrchestrationError::JobNotFound(job_id))?;
        job.validate().map_err(OrchestrationError::Validation)?;

        let needing_confirmation = job.confirmation_required_actions();
        if !needing_confirmation.is_empty() && confirmation_token.is_none() {
            return Err(OrchestrationError::ConfirmationRequired {
                job_name: job.name.clone(),
                action_orders: needing_confirmation.iter().map(|a| a.order).collect(),
            });
        }

        let running = self.repository.running_execution_count().await?;
        if running >= self.execution_config.max_running_executions {
            return Err(OrchestrationError::ConcurrencyLimitExceeded {
                running,
                ceiling: self.execution_config.max_running_executions,
            });
        }

        let targets = self.eligible_targets(&job).await?;

        let execution_number = self.repository.next_execution_number(job_id).await?;
        let execution = JobExecution::new(
            job_id,
            execution_number,
            triggered_by,
            i32::try_from(targets.len()).unwrap_or(i32::MAX),
        );
        let execution_id = execution.execution_id;
        self.repository.insert_execution(execution).await?;

        let mut branches = Vec::with_capacity(targets.len());
        for (index, target) in targets.iter().enumerate() {
            let branch = ExecutionBranch::new(
                execution_id,
                target.target_id,
                i32::try_from(index).unwrap_or(i32::MAX - 1) + 1,
            );
            self.repository.insert_branch(branch.clone()).await?;
            branches.push(branch);
        }

        let cancellation = CancellationFlag::new();
        self.cancellations.insert(execution_id, cancellation.clone());

        ExecutionStateMachine::new(
            execution_id,
            self.repository.clone(),
            self.event_publisher.clone(),
        )
        .transition(ExecutionEvent::Start)
        .await?;
        log_execution_operation(
            "execution_started",
            Some(execution_id),
            Some(&job.name),
            "running",
            Some(&format!("{} targets, triggered by {triggered_by}", targets.len())),
        );

        self.dispatch_branches(execution_id, Arc::new(job), branches, targets, cancellation)
            .await;

        Ok(execution_id)
    }

    /// Resolve and filter the job's targets before any record is created
    async fn eligible_targets(&self, job: &Job) -> OrchestrationResult<Vec<Target>> {
        let mut targets = Vec::with_capacity(job.target_ids.len());
        for target_id in &job.target_ids {
            let target = self
                .target_registry
                .fetch_target(*target_id)
                .await?
                .ok_or(OrchestrationError::TargetNotFound(*target_id))?;

            if self.execution_config.skip_critical_targets {
                let health = self.repository.fetch_health_state(target.target_id).await?;
                if health.map_or(false, |state| state.status == HealthStatus::Critical) {
                    warn!(
                        target = %target.name,
                        "Skipping critical target for new execution"
                    );
                    continue;
                }
            }
            targets.push(target);
        }

        if targets.is_empty() {
            return Err(OrchestrationError::Validation(format!(
                "job '{}' has no eligible targets",
                job.name
            )));
        }
        Ok(targets)
    }

    /// Queue every branch and spawn the supervisor that finalizes the
    /// execution once all outcomes are in
    async fn dispatch_branches(
        &self,
        execution_id: Uuid,
        job: Arc<Job>,
        branches: Vec<ExecutionBranch>,
        targets: Vec<Target>,
        cancellation: CancellationFlag,
    ) {
        let total = branches.len();
        let (outcome_tx, outcome_rx) = mpsc::channel::<BranchOutcome>(total.max(1));

        for (branch, target) in branches.into_iter().zip(targets.into_iter()) {
            let coordinator = self.coordinator.clone();
            let permits = self.branch_permits.clone();
            let job = job.clone();
            let cancellation = cancellation.clone();
            let outcome_tx = outcome_tx.clone();
            let branch_id = branch.branch_id;
            let task_name = format!("branch.{branch_id}");

            let queued = self
                .queue
                .enqueue(task_name, async move {
                    // The permit bounds system-wide running branches; it is
                    // taken before the branch is claimed and held until the
                    // terminal transition lands.
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return;
                    };
                    let outcome = coordinator
                        .run_branch(branch, target, job, cancellation)
                        .await;
                    outcome_tx.send(outcome).await.ok();
                })
                .await;

            if let Err(error) = queued {
                warn!(
                    execution_id = %execution_id,
                    branch_id = %branch_id,
                    error = %error,
                    "Failed to queue branch, marking it failed"
                );
                self.repository
                    .transition_branch(branch_id, BranchState::Scheduled, BranchState::Failed)
                    .await
                    .ok();
            }
        }
        drop(outcome_tx);

        let repository = self.repository.clone();
        let event_publisher = self.event_publisher.clone();
        let cancellations = self.cancellations.clone();
        tokio::spawn(async move {
            supervise_execution(
                execution_id,
                total,
                outcome_rx,
                repository,
                event_publisher,
                cancellations,
            )
            .await;
        });
    }

    /// Request cancellation of a non-terminal execution
    ///
    /// Scheduled branches are cancelled immediately; running branches stop
    /// at their next action boundary. Cancelling a terminal execution is a
    /// no-op that reports the current state.
    pub async fn cancel_execution(
        &self,
        execution_id: Uuid,
    ) -> OrchestrationResult<ExecutionState> {
        let execution = self
            .repository
            .fetch_execution(execution_id)
            .await?
            .ok_or(OrchestrationError::ExecutionNotFound(execution_id))?;
        if execution.status.is_terminal() {
            return Ok(execution.status);
        }

        if let Some(flag) = self.cancellations.get(&execution_id) {
            flag.request();
        }

        let machine = ExecutionStateMachine::new(
            execution_id,
            self.repository.clone(),
            self.event_publisher.clone(),
        );
        let state = match machine.transition(ExecutionEvent::Cancel).await {
            Ok(state) => state,
            // The execution finished in the meantime; report what happened
            Err(_) => {
                self.repository
                    .fetch_execution(execution_id)
                    .await?
                    .map(|execution| execution.status)
                    .ok_or(OrchestrationError::ExecutionNotFound(execution_id))?
            }
        };

        for branch in self.repository.branches_for_execution(execution_id).await? {
            if branch.status == BranchState::Scheduled {
                self.repository
                    .transition_branch(
                        branch.branch_id,
                        BranchState::Scheduled,
                        BranchState::Cancelled,
                    )
                    .await?;
            }
        }

        log_execution_operation(
            "execution_cancelled",
            Some(execution_id),
            None,
            &state.to_string(),
            None,
        );
        Ok(state)
    }

    /// Full status view: execution, branches, and per-attempt results
    pub async fn get_execution_status(
        &self,
        execution_id: Uuid,
    ) -> OrchestrationResult<ExecutionDetail> {
        let execution = self
            .repository
            .fetch_execution(execution_id)
            .await?
            .ok_or(OrchestrationError::ExecutionNotFound(execution_id))?;

        let mut branches = Vec::new();
        for branch in self.repository.branches_for_execution(execution_id).await? {
            let results = self
                .repository
                .action_results_for_branch(branch.branch_id)
                .await?;
            branches.push(BranchDetail { branch, results });
        }

        Ok(ExecutionDetail {
            execution,
            branches,
        })
    }

    /// List executions matching the filter, newest first
    pub async fn list_executions(
        &self,
        filter: &ExecutionFilter,
    ) -> OrchestrationResult<Vec<JobExecution>> {
        Ok(self.repository.list_executions(filter).await?)
    }

    /// Current health record for one target, if it is tracked
    pub async fn get_health_status(
        &self,
        target_id: Uuid,
    ) -> OrchestrationResult<Option<TargetHealthState>> {
        Ok(self.repository.fetch_health_state(target_id).await?)
    }

    /// One scheduler pass: trigger every recurring job that has come due
    ///
    /// A job is due when its last execution was scheduled at least one
    /// interval ago and is no longer in flight. Returns how many executions
    /// were triggered.
    pub async fn run_due_scheduled_jobs(&self) -> OrchestrationResult<usize> {
        let now = Utc::now();
        let mut triggered = 0;

        for job in self.job_store.scheduled_jobs().await? {
            let Some(rule) = job.schedule else { continue };

            if !job.confirmation_required_actions().is_empty() {
                warn!(
                    job = %job.name,
                    "Job requires confirmation and cannot run on a schedule"
                );
                continue;
            }

            let latest = self
                .repository
                .list_executions(&ExecutionFilter::for_job(job.job_id).with_limit(1))
                .await?;
            let due = match latest.first() {
                None => true,
                Some(previous) if !previous.status.is_terminal() => false,
                Some(previous) => {
                    let interval =
                        ChronoDuration::seconds(i64::try_from(rule.interval_seconds).unwrap_or(i64::MAX));
                    previous.scheduled_at + interval <= now
                }
            };
            if !due {
                continue;
            }

            match self
                .start_execution(job.job_id, TriggerSource::Schedule, None)
                .await
            {
                Ok(execution_id) => {
                    info!(
                        job = %job.name,
                        execution_id = %execution_id,
                        "Scheduled job triggered"
                    );
                    triggered += 1;
                }
                Err(error) => {
                    warn!(job = %job.name, error = %error, "Scheduled trigger failed");
                }
            }
        }

        Ok(triggered)
    }
}

/// Collect branch outcomes and finalize the execution record
async fn supervise_execution(
    execution_id: Uuid,
    total: usize,
    mut outcome_rx: mpsc::Receiver<BranchOutcome>,
    repository: Arc<dyn OrchestratorRepository>,
    event_publisher: EventPublisher,
    cancellations: Arc<DashMap<Uuid, CancellationFlag>>,
) {
    let mut successful = 0usize;
    let mut first_error: Option<String> = None;

    while let Some(outcome) = outcome_rx.recv().await {
        if outcome.is_successful() {
            successful += 1;
        } else if first_error.is_none() {
            first_error = Some(
                outcome
                    .error
                    .unwrap_or_else(|| format!("branch ended {}", outcome.state)),
            );
        }
    }

    // Branches that never reported (queue closed, lost race) count as failed
    let failed = total - successful;
    let final_state = if failed == 0 {
        ExecutionState::Completed
    } else {
        ExecutionState::Failed
    };
    let error_message = if failed == 0 {
        None
    } else {
        Some(format!(
            "{failed} of {total} targets failed: {}",
            first_error.unwrap_or_else(|| "branch did not report".to_string())
        ))
    };

    let finalized = repository
        .finalize_execution(
            execution_id,
            final_state,
            i32::try_from(successful).unwrap_or(i32::MAX),
            i32::try_from(failed).unwrap_or(i32::MAX),
            error_message.clone(),
        )
        .await;

    match finalized {
        Ok(true) => {
            let event_name = match final_state {
                ExecutionState::Completed => "execution.completed",
                _ => "execution.failed",
            };
            event_publisher
                .publish(
                    event_name,
                    serde_json::json!({
                        "execution_id": execution_id,
                        "successful_targets": successful,
                        "failed_targets": failed,
                    }),
                )
                .await
                .ok();
            log_execution_operation(
                "execution_finalized",
                Some(execution_id),
                None,
                &final_state.to_string(),
                error_message.as_deref(),
            );
        }
        Ok(false) => {
            // Already terminal (cancelled under us); keep the counters honest
            repository
                .update_execution_counters(
                    execution_id,
                    i32::try_from(successful).unwrap_or(i32::MAX),
                    i32::try_from(failed).unwrap_or(i32::MAX),
                )
                .await
                .ok();
        }
        Err(error) => {
            warn!(
                execution_id = %execution_id,
                error = %error,
                "Failed to finalize execution"
            );
        }
    }

    cancellations.remove(&execution_id);
}
