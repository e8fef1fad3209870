//! # Branch Coordinator
//!
//! Owns one branch for its whole lifetime: claims it (scheduled → running),
//! drives the action runner, and lands the terminal transition. Every
//! status write goes through the branch state machine, so a race with the
//! reaper or a cancellation is observed instead of overwritten.

use std::sync::Arc;
use tracing::warn;

use super::action_runner::{ActionRunner, ActionsOutcome};
use super::types::{BranchOutcome, CancellationFlag};
use crate::events::publisher::EventPublisher;
use crate::logging::log_branch_operation;
use crate::models::{ExecutionBranch, Job, Target};
use crate::repository::OrchestratorRepository;
use crate::state_machine::{BranchEvent, BranchState, BranchStateMachine, StateMachineError};

pub struct BranchCoordinator {
    repository: Arc<dyn OrchestratorRepository>,
    event_publisher: EventPublisher,
    runner: Arc<ActionRunner>,
}

impl BranchCoordinator {
    pub fn new(
        repository: Arc<dyn OrchestratorRepository>,
        event_publisher: EventPublisher,
        runner: Arc<ActionRunner>,
    ) -> Self {
        Self {
            repository,
            event_publisher,
            runner,
        }
    }

    /// Run one branch start to finish and report how it ended
    ///
    /// Never returns an error: any failure to make progress lands the
    /// branch in a failed state and is reported through the outcome.
    pub async fn run_branch(
        &self,
        branch: ExecutionBranch,
        target: Target,
        job: Arc<Job>,
        cancellation: CancellationFlag,
    ) -> BranchOutcome {
        let machine = BranchStateMachine::new(
            branch.branch_id,
            self.repository.clone(),
            self.event_publisher.clone(),
        );

        if cancellation.is_requested() {
            return self
                .land(&machine, &branch, &target, BranchEvent::Cancel, None)
                .await;
        }

        // Claim the branch; losing this race means cancellation or the
        // reaper got there first, and the current state is the outcome.
        if let Err(error) = machine.transition(BranchEvent::Start).await {
            return self.observed_outcome(&branch, &target, error).await;
        }
        log_branch_operation(
            "branch_started",
            Some(branch.execution_id),
            Some(branch.branch_id),
            Some(&target.name),
            "running",
            None,
        );

        let outcome = self
            .runner
            .run_actions(&branch, &target, &job, &cancellation)
            .await;

        let (event, error) = match outcome {
            Ok(ActionsOutcome::Completed) => (BranchEvent::Complete, None),
            Ok(ActionsOutcome::Failed { message }) => {
                (BranchEvent::Fail(message.clone()), Some(message))
            }
            Ok(ActionsOutcome::Cancelled) => (BranchEvent::Cancel, None),
            Err(error) => {
                let message = error.to_string();
                (BranchEvent::Fail(message.clone()), Some(message))
            }
        };

        self.land(&machine, &branch, &target, event, error).await
    }

    async fn land(
        &self,
        machine: &BranchStateMachine,
        branch: &ExecutionBranch,
        target: &Target,
        event: BranchEvent,
        error: Option<String>,
    ) -> BranchOutcome {
        match machine.transition(event).await {
            Ok(state) => {
                log_branch_operation(
                    "branch_finished",
                    Some(branch.execution_id),
                    Some(branch.branch_id),
                    Some(&target.name),
                    &state.to_string(),
                    error.as_deref(),
                );
                BranchOutcome {
                    branch_id: branch.branch_id,
                    target_id: branch.target_id,
                    state,
                    error,
                }
            }
            Err(race) => self.observed_outcome(branch, target, race).await,
        }
    }

    /// Report whatever state the branch actually landed in after a lost race
    async fn observed_outcome(
        &self,
        branch: &ExecutionBranch,
        target: &Target,
        error: StateMachineError,
    ) -> BranchOutcome {
        warn!(
            branch_id = %branch.branch_id,
            target = %target.name,
            error = %error,
            "Branch transition lost a race, reporting observed state"
        );
        let state = self
            .repository
            .fetch_branch(branch.branch_id)
            .await
            .ok()
            .flatten()
            .map(|fetched| fetched.status)
            .unwrap_or(BranchState::Failed);
        BranchOutcome {
            branch_id: branch.branch_id,
            target_id: branch.target_id,
            state,
            error: Some(error.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ExecutionConfig, RetryConfig};
    use crate::connection::{
        CommandOutput, CommandRequest, ConnectionError, ConnectionExecutor, ExecutorRegistry,
    };
    use crate::credentials::StaticCredentialResolver;
    use crate::models::{
        Action, ActionType, CommunicationMethod, ProtocolKind, TargetEnvironment,
    };
    use crate::repository::InMemoryRepository;
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;
    use uuid::Uuid;

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

    fn coordinator_harness() -> (BranchCoordinator, Arc<InMemoryRepository>, Target) {
        let repository = Arc::new(InMemoryRepository::new());
        let executors = Arc::new(ExecutorRegistry::new());
        executors.register(Arc::new(EchoExecutor));
        let credentials = Arc::new(StaticCredentialResolver::new());
        credentials.insert("cred-1", "deploy", "secret");

        let runner = Arc::new(ActionRunner::new(
            repository.clone(),
            executors,
            credentials,
            ExecutionConfig::default(),
            RetryConfig::default(),
        ));
        let coordinator = BranchCoordinator::new(
            repository.clone(),
            EventPublisher::default(),
            runner,
        );
        let target = Target::new(
            "web-01",
            "10.0.1.10",
            TargetEnvironment::Test,
            vec![CommunicationMethod::new(ProtocolKind::Ssh, 22, "cred-1")],
        );
        (coordinator, repository, target)
    }

    #[tokio::test]
    async fn test_successful_branch_lands_completed() {
        let (coordinator, repository, target) = coordinator_harness();
        let job = Arc::new(Job::new(
            "uptime",
            vec![Action::new(1, ActionType::Command, json!({ "command": "uptime" }))],
            vec![target.target_id],
        ));
        let branch = ExecutionBranch::new(Uuid::new_v4(), target.target_id, 1);
        repository.insert_branch(branch.clone()).await.unwrap();

        let outcome = coordinator
            .run_branch(branch.clone(), target, job, CancellationFlag::new())
            .await;
        assert_eq!(outcome.state, BranchState::Completed);
        assert!(outcome.is_successful());

        let stored = repository
            .fetch_branch(branch.branch_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, BranchState::Completed);
        assert!(stored.started_at.is_some());
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_pre_claim_cancellation_lands_cancelled() {
        let (coordinator, repository, target) = coordinator_harness();
        let job = Arc::new(Job::new(
            "uptime",
            vec![Action::new(1, ActionType::Command, json!({ "command": "uptime" }))],
            vec![target.target_id],
        ));
        let branch = ExecutionBranch::new(Uuid::new_v4(), target.target_id, 1);
        repository.insert_branch(branch.clone()).await.unwrap();

        let cancellation = CancellationFlag::new();
        cancellation.request();

        let outcome = coordinator
            .run_branch(branch.clone(), target, job, cancellation)
            .await;
        assert_eq!(outcome.state, BranchState::Cancelled);

        // Never claimed, so no action ever ran
        assert!(repository
            .action_results_for_branch(branch.branch_id)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_lost_claim_race_reports_observed_state() {
        let (coordinator, repository, target) = coordinator_harness();
        let job = Arc::new(Job::new(
            "uptime",
            vec![Action::new(1, ActionType::Command, json!({ "command": "uptime" }))],
            vec![target.target_id],
        ));
        let branch = ExecutionBranch::new(Uuid::new_v4(), target.target_id, 1);
        repository.insert_branch(branch.clone()).await.unwrap();

        // Something else already cancelled the branch
        repository
            .transition_branch(branch.branch_id, BranchState::Scheduled, BranchState::Cancelled)
            .await
            .unwrap();

        let outcome = coordinator
            .run_branch(branch, target, job, CancellationFlag::new())
            .await;
        assert_eq!(outcome.state, BranchState::Cancelled);
        assert!(outcome.error.is_some());
    }
}
