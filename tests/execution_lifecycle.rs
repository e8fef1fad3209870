//! End-to-end execution lifecycle: trigger, fan-out, aggregation, listing

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

/// Succeeds instantly, echoing the command back as stdout
struct EchoExecutor;

#[async_trait]
impl ConnectionExecutor for EchoExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Ssh
    }

    async fn execute(
        &self,
        _target: &Target,
        _method: &CommunicationMethod,
        request: CommandRequest,
    ) -> Result<CommandOutput, ConnectionError> {
        Ok(CommandOutput {
            stdout: request.payload.describe(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::from_millis(1),
        })
    }
}

fn three_step_job(target_ids: Vec<uuid::Uuid>) -> Job {
    Job::new(
        "rolling-restart",
        vec![
            Action::new(1, ActionType::Command, json!({ "command": "systemctl stop app" })),
            Action::new(2, ActionType::Command, json!({ "command": "systemctl start app" })),
            Action::new(3, ActionType::Command, json!({ "command": "systemctl status app" })),
        ],
        target_ids,
    )
}

#[tokio::test]
async fn test_three_actions_across_two_targets_complete() {
    let harness = build_harness(test_config());
    harness.system.register_executor(Arc::new(EchoExecutor));

    let target_ids = register_targets(&harness, 2);
    let job_id = insert_job(&harness, three_step_job(target_ids));

    let orchestrator = harness.orchestrator();
    let execution_id = orchestrator
        .start_execution(job_id, TriggerSource::Manual, None)
        .await
        .unwrap();

    let detail = wait_terminal(&orchestrator, execution_id).await;
    assert_eq!(detail.execution.status, ExecutionState::Completed);
    assert_eq!(detail.execution.total_targets, 2);
    assert_eq!(detail.execution.successful_targets, 2);
    assert_eq!(detail.execution.failed_targets, 0);
    assert_eq!(detail.execution.execution_number, 1);
    assert!(detail.execution.started_at.is_some());
    assert!(detail.execution.completed_at.is_some());
    assert!(detail.execution.duration().is_some());

    assert_eq!(detail.branches.len(), 2);
    for branch in &detail.branches {
        assert_eq!(branch.branch.status, BranchState::Completed);
        assert!(branch.branch.completed_at.is_some());

        // One result per action, in strictly ascending gap-free order
        let orders: Vec<i32> = branch.results.iter().map(|result| result.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        for result in &branch.results {
            assert_eq!(result.status, ActionState::Completed);
            assert!(result.executed_command.is_some());
            assert!(result.completed_at.is_some());
        }
    }

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_completed_at_set_exactly_on_terminal_states() {
    let harness = build_harness(test_config());
    harness.system.register_executor(Arc::new(EchoExecutor));

    let target_ids = register_targets(&harness, 1);
    let job_id = insert_job(&harness, three_step_job(target_ids));

    let orchestrator = harness.orchestrator();
    let execution_id = orchestrator
        .start_execution(job_id, TriggerSource::Api, None)
        .await
        .unwrap();

    // While non-terminal, completed_at stays unset
    let early = orchestrator.get_execution_status(execution_id).await.unwrap();
    if !early.execution.is_terminal() {
        assert!(early.execution.completed_at.is_none());
    }

    let detail = wait_terminal(&orchestrator, execution_id).await;
    assert!(detail.execution.is_terminal());
    assert!(detail.execution.completed_at.is_some());

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_execution_numbers_increase_per_job() {
    let harness = build_harness(test_config());
    harness.system.register_executor(Arc::new(EchoExecutor));

    let target_ids = register_targets(&harness, 1);
    let job_id = insert_job(&harness, three_step_job(target_ids));
    let orchestrator = harness.orchestrator();

    for expected in 1..=3i64 {
        let execution_id = orchestrator
            .start_execution(job_id, TriggerSource::Manual, None)
            .await
            .unwrap();
        let detail = wait_terminal(&orchestrator, execution_id).await;
        assert_eq!(detail.execution.execution_number, expected);
    }

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_listing_filters_and_orders_newest_first() {
    let harness = build_harness(test_config());
    harness.system.register_executor(Arc::new(EchoExecutor));

    let target_ids = register_targets(&harness, 1);
    let job_id = insert_job(&harness, three_step_job(target_ids.clone()));
    let other_job_id = insert_job(&harness, three_step_job(target_ids));
    let orchestrator = harness.orchestrator();

    for _ in 0..2 {
        let execution_id = orchestrator
            .start_execution(job_id, TriggerSource::Manual, None)
            .await
            .unwrap();
        wait_terminal(&orchestrator, execution_id).await;
    }
    let other = orchestrator
        .start_execution(other_job_id, TriggerSource::Manual, None)
        .await
        .unwrap();
    wait_terminal(&orchestrator, other).await;

    let for_job = orchestrator
        .list_executions(&ExecutionFilter::for_job(job_id))
        .await
        .unwrap();
    assert_eq!(for_job.len(), 2);
    assert!(for_job[0].scheduled_at >= for_job[1].scheduled_at);
    assert!(for_job.iter().all(|execution| execution.job_id == job_id));

    let completed = orchestrator
        .list_executions(
            &ExecutionFilter::default().with_status(ExecutionState::Completed),
        )
        .await
        .unwrap();
    assert_eq!(completed.len(), 3);

    let limited = orchestrator
        .list_executions(&ExecutionFilter::default().with_limit(1))
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_broken_wait_action_fails_its_branch() {
    let harness = build_harness(test_config());
    harness.system.register_executor(Arc::new(EchoExecutor));

    let target_ids = register_targets(&harness, 1);
    let job = Job::new(
        "pause-only",
        vec![Action::new(1, ActionType::Wait, json!({}))],
        target_ids,
    );
    let job_id = insert_job(&harness, job);

    let orchestrator = harness.orchestrator();
    let execution_id = orchestrator
        .start_execution(job_id, TriggerSource::Manual, None)
        .await
        .unwrap();

    let detail = wait_terminal(&orchestrator, execution_id).await;
    assert_eq!(detail.execution.status, ExecutionState::Failed);
    assert_eq!(detail.execution.failed_targets, 1);

    assert_eq!(detail.branches.len(), 1);
    assert_eq!(detail.branches[0].branch.status, BranchState::Failed);
    assert_eq!(detail.branches[0].results.len(), 1);
    assert_eq!(detail.branches[0].results[0].status, ActionState::Failed);

    harness.system.shutdown().await;
}

#[tokio::test]
async fn test_unknown_job_and_execution_are_clean_errors() {
    let harness = build_harness(test_config());
    let orchestrator = harness.orchestrator();

    let missing_job = orchestrator
        .start_execution(uuid::Uuid::new_v4(), TriggerSource::Manual, None)
        .await;
    assert!(missing_job.is_err());

    let missing_execution = orchestrator
        .get_execution_status(uuid::Uuid::new_v4())
        .await;
    assert!(missing_execution.is_err());

    harness.system.shutdown().await;
}
