use std::sync::Arc;

use super::{
    errors::{StateMachineError, StateMachineResult},
    events::ExecutionEvent,
    states::ExecutionState,
};
use crate::events::publisher::EventPublisher;
use crate::repository::OrchestratorRepository;

/// State machine for one job execution record
///
/// Transitions are persisted with a status precondition (compare-and-set)
/// so that a coordinator, the reaper, and a cancellation request can race
/// without clobbering each other's writes.
pub struct ExecutionStateMachine {
    execution_id: uuid::Uuid,
    repository: Arc<dyn OrchestratorRepository>,
    event_publisher: EventPublisher,
}

impl ExecutionStateMachine {
    /// Create a new execution state machine instance
    pub fn new(
        execution_id: uuid::Uuid,
        repository: Arc<dyn OrchestratorRepository>,
        event_publisher: EventPublisher,
    ) -> Self {
        Self {
            execution_id,
            repository,
            event_publisher,
        }
    }

    /// Get the current state of the execution
    pub async fn current_state(&self) -> StateMachineResult<ExecutionState> {
        let execution = self
            .repository
            .fetch_execution(self.execution_id)
            .await?
            .ok_or(StateMachineError::RecordNotFound(self.execution_id))?;
        Ok(execution.status)
    }

    /// Attempt to transition the execution state
    pub async fn transition(&self, event: ExecutionEvent) -> StateMachineResult<ExecutionState> {
        let current_state = self.current_state().await?;
        let target_state = determine_target_state(current_state, &event)?;

        let applied = self
            .repository
            .transition_execution(self.execution_id, current_state, target_state)
            .await?;
        if !applied {
            return Err(StateMachineError::ConcurrentModification(format!(
                "execution {} left state {current_state} before transition applied",
                self.execution_id
            )));
        }

        self.event_publisher
            .publish(
                event.name(),
                serde_json::json!({
                    "execution_id": self.execution_id,
                    "from": current_state,
                    "to": target_state,
                }),
            )
            .await
            .ok();

        Ok(target_state)
    }

    /// Check if the execution is in a terminal state
    pub async fn is_terminal(&self) -> StateMachineResult<bool> {
        Ok(self.current_state().await?.is_terminal())
    }
}

/// Determine the target state based on current state and event
pub fn determine_target_state(
    current_state: ExecutionState,
    event: &ExecutionEvent,
) -> StateMachineResult<ExecutionState> {
    let target = match (current_state, event) {
        (ExecutionState::Scheduled, ExecutionEvent::Start) => ExecutionState::Running,

        (ExecutionState::Running, ExecutionEvent::Complete) => ExecutionState::Completed,
        (ExecutionState::Running, ExecutionEvent::Fail(_)) => ExecutionState::Failed,

        // Scheduled executions may fail before any branch dispatches
        (ExecutionState::Scheduled, ExecutionEvent::Fail(_)) => ExecutionState::Failed,

        (ExecutionState::Scheduled, ExecutionEvent::Cancel) => ExecutionState::Cancelled,
        (ExecutionState::Running, ExecutionEvent::Cancel) => ExecutionState::Cancelled,

        (from_state, _) => {
            return Err(StateMachineError::InvalidTransition {
                from: from_state.to_string(),
                event: format!("{event:?}"),
            })
        }
    };

    Ok(target)
}
