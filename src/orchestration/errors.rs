use thiserror::Error;
use uuid::Uuid;

use crate::connection::ConnectionError;
use crate::dispatch::DispatchError;
use crate::repository::RepositoryError;
use crate::state_machine::StateMachineError;

/// Errors surfaced by orchestrator operations
///
/// Validation and confirmation failures happen before any record is
/// created, so a rejected trigger leaves no trace in the repository.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Job '{job_name}' has dangerous actions requiring confirmation (orders {action_orders:?})")]
    ConfirmationRequired {
        job_name: String,
        action_orders: Vec<i32>,
    },

    #[error("Too many running executions: {running} of {ceiling} allowed")]
    ConcurrencyLimitExceeded { running: usize, ceiling: usize },

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Execution {0} not found")]
    ExecutionNotFound(Uuid),

    #[error("Target {0} not found in registry")]
    TargetNotFound(Uuid),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;
