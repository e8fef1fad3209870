use std::sync::Arc;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::BranchEvent,
    states::BranchState,
};
use crate::events::publisher::EventPublisher;
use crate::repository::OrchestratorRepository;

/// State machine for one per-target execution branch
///
/// A branch is owned by exactly one coordinator at a time; the reaper only
/// touches branches whose coordinator has gone away. Both paths funnel
/// through conditional writes keyed on the current status, which makes a
/// lost race observable instead of silently overwriting a newer state.
pub struct BranchStateMachine {
    branch_id: uuid::Uuid,
    repository: Arc<dyn OrchestratorRepository>,
    event_publisher: EventPublisher,
}

impl BranchStateMachine {
    /// Create a new branch state machine instance
    pub fn new(
        branch_id: uuid::Uuid,
        repository: Arc<dyn OrchestratorRepository>,
        event_publisher: EventPublisher,
    ) -> Self {
        Self {
            branch_id,
            repository,
            event_publisher,
        }
    }

    /// Get the current state of the branch
    pub async fn current_state(&self) -> StateMachineResult<BranchState> {
        let branch = self
            .repository
            .fetch_branch(self.branch_id)
            .await?
            .ok_or(StateMachineError::RecordNotFound(self.branch_id))?;
        Ok(branch.status)
    }

    /// Attempt to transition the branch state
    pub async fn transition(&self, event: BranchEvent) -> StateMachineResult<BranchState> {
        let current_state = self.current_state().await?;
        let target_state = determine_target_state(current_state, &event)?;

        let applied = self
            .repository
            .transition_branch(self.branch_id, current_state, target_state)
            .await?;
        if !applied {
            return Err(StateMachineError::ConcurrentModification(format!(
                "branch {} left state {current_state} before transition applied",
                self.branch_id
            )));
        }

        self.event_publisher
            .publish(
                event.name(),
                serde_json::json!({
                    "branch_id": self.branch_id,
                    "from": current_state,
                    "to": target_state,
                }),
            )
            .await
            .ok();

        Ok(target_state)
    }
}

/// Determine the target state based on current state and event
///
/// Branch states are monotonically non-decreasing: scheduled → running →
/// terminal, with cancellation allowed from either pre-terminal state.
pub fn determine_target_state(
    current_state: BranchState,
    event: &BranchEvent,
) -> StateMachineResult<BranchState> {
    let target = match (current_state, event) {
        (BranchState::Scheduled, BranchEvent::Start) => BranchState::Running,

        (BranchState::Running, BranchEvent::Complete) => BranchState::Completed,
        (BranchState::Running, BranchEvent::Fail(_)) => BranchState::Failed,
        (BranchState::Running, BranchEvent::Timeout) => BranchState::Timeout,

        // A branch that never got picked up can still fail (pre-dispatch
        // recovery) or be cancelled with the rest of the execution.
        (BranchState::Scheduled, BranchEvent::Fail(_)) => BranchState::Failed,
        (BranchState::Scheduled, BranchEvent::Cancel) => BranchState::Cancelled,
        (BranchState::Running, BranchEvent::Cancel) => BranchState::Cancelled,

        (from_state, _) => {
            return Err(StateMachineError::InvalidTransition {
                from: from_state.to_string(),
                event: format!("{event:?}"),
            })
        }
    };

    Ok(target)
}
