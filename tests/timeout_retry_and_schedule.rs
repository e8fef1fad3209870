//! Timeout handling, retry policy, and the recurring-job scheduler

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fleetops_core::connection::{
    CommandOutput, CommandRequest, ConnectionError, ConnectionExecutor,
};
use fleetops_core::models::{
    Action, ActionType, CommunicationMethod, Job, ProtocolKind, Target, TriggerSource,
};
use fleetops_core::repository::ExecutionFilter;
use fleetops_core::state_machine::{ActionState, BranchState, ExecutionState};
use serde_json::json;

use common::{build_harness, insert_job, register_targets, test_config, wait_terminal};

/// Every command times out
struct TimeoutExecutor;

#[async_trait]
impl ConnectionExecutor for TimeoutExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Ssh
    }

    async fn execute(
        &self,
        _target: &Target,
        _method: &CommunicationMethod,
        _request: CommandRequest,
    ) -> Result<CommandOutput, ConnectionError> {
        Err(ConnectionError::CommandTimeout {
            timeout: Duration::from_millis(10),
        })
    }
}

/// Every command succeeds instantly
struct InstantExecutor;

#[async_trait]
impl ConnectionExecutor for InstantExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Ssh
    }

    async fn execute(
        &self,
        _target: &Target,
        _method: &CommunicationMethod,
        _request: CommandRequest,
    ) -> Result<CommandOutput, ConnectionError> {
        Ok(CommandOutput {
            stdout: "ok".to_string(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        })
    }
}

fn uptime_job(name: &str, target_ids: Vec<uuid::Uuid>) -> Job {
    Job::new(
        name,
        vec![Action::new(1, ActionType::Command, json!({ "command": "uptime" }))],
        target_ids,
    )
}

#[tokio::test]
async fn test_timed_out_action_is_retried_then_fails_the_branch() {
    let mut config = test_config();
    config.retry.max_retries = 2;
    let harness = build_harness(config);
    harness.system.register_executor(Arc::new(TimeoutExecutor));

    let target_ids = register_targets(&harness, 2);
    let job_id = insert_job(&harness, uptime_job("flaky-fleet", target_ids));

    let orchestrator = harness.orchestrator();
    let execution_id = orchestrator
        .start_execution(job_id, TriggerSource::Manual, None)
        .await
        .unwrap();

    let detail = wait_terminal(&orchestrator, execution_id).await;
    assert_eq!(detail.execution.status, ExecutionState::Failed);
    assert_eq!(detail.execution.successful_targets, 0);
    assert_eq!(detail.execution.failed_targets, 2);
    assert!(detail
        .execution
        .error_message
        .as_deref()
        .unwrap()
        .contains("2 of 2 targets failed"));

    for branch in &detail.branches {
        assert_eq!(branch.branch.status, BranchState::Failed);

        // Initial attempt plus max_retries, all recorded and linked
        assert_eq!(branch.results.len(), 3);
        assert!(!branch.results[0].is_retry);
        assert_eq!(branch.results[1].retry_count, 1);
        assert_eq!(
            branch.results[1].previous_attempt,
            Some(branch.results[0].result_id)
        );
        assert_eq!(branch.results[2].retry_count, 2);
        for result in &branch.results {
            assert_eq!(result.status, ActionState::Failed);
            assert!(result.error.as_deref().unwrap().contains("timed out"));
        }
    }

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_retries_disabled_means_one_attempt_per_action() {
    let mut config = test_config();
    config.retry.enable_retry = false;
    config.retry.max_retries = 5;
    let harness = build_harness(config);
    harness.system.register_executor(Arc::new(TimeoutExecutor));

    let target_ids = register_targets(&harness, 1);
    let job_id = insert_job(&harness, uptime_job("no-retry", target_ids));

    let orchestrator = harness.orchestrator();
    let execution_id = orchestrator
        .start_execution(job_id, TriggerSource::Manual, None)
        .await
        .unwrap();

    let detail = wait_terminal(&orchestrator, execution_id).await;
    assert_eq!(detail.execution.status, ExecutionState::Failed);
    assert_eq!(detail.branches[0].results.len(), 1);

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_one_failed_target_fails_the_execution_not_the_other_branch() {
    let harness = build_harness(test_config());
    harness.system.register_executor(Arc::new(InstantExecutor));

    let mut target_ids = register_targets(&harness, 1);
    // Second target only speaks a protocol nothing is registered for
    let unreachable = Target::new(
        "island-01",
        "10.9.9.9",
        fleetops_core::models::TargetEnvironment::Test,
        vec![CommunicationMethod::new(ProtocolKind::WinRm, 5985, "test-cred")],
    );
    target_ids.push(unreachable.target_id);
    harness.targets.register(unreachable);

    let job_id = insert_job(&harness, uptime_job("mixed-fleet", target_ids));
    let orchestrator = harness.orchestrator();
    let execution_id = orchestrator
        .start_execution(job_id, TriggerSource::Manual, None)
        .await
        .unwrap();

    let detail = wait_terminal(&orchestrator, execution_id).await;
    assert_eq!(detail.execution.status, ExecutionState::Failed);
    assert_eq!(detail.execution.successful_targets, 1);
    assert_eq!(detail.execution.failed_targets, 1);

    let states: Vec<BranchState> = detail
        .branches
        .iter()
        .map(|branch| branch.branch.status)
        .collect();
    assert!(states.contains(&BranchState::Completed));
    assert!(states.contains(&BranchState::Failed));

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_scheduler_pass_triggers_due_jobs_once() {
    let harness = build_harness(test_config());
    harness.system.register_executor(Arc::new(InstantExecutor));

    let target_ids = register_targets(&harness, 1);
    let job = uptime_job("hourly-audit", target_ids).with_schedule(3600);
    let job_id = insert_job(&harness, job);
    let orchestrator = harness.orchestrator();

    // Never run before, so the first pass triggers it
    let triggered = orchestrator.run_due_scheduled_jobs().await.unwrap();
    assert_eq!(triggered, 1);

    let listed = orchestrator
        .list_executions(&ExecutionFilter::for_job(job_id))
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].triggered_by, TriggerSource::Schedule);
    wait_terminal(&orchestrator, listed[0].execution_id).await;

    // Within the interval, a second pass does nothing
    let again = orchestrator.run_due_scheduled_jobs().await.unwrap();
    assert_eq!(again, 0);

    harness.system.shutdown().await;
}
