use thiserror::Error;

/// Errors raised while evaluating or persisting state transitions
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("Invalid state transition from {from:?} via {event}")]
    InvalidTransition { from: String, event: String },

    #[error("Record {0} not found")]
    RecordNotFound(uuid::Uuid),

    #[error("Transition lost a conditional write race: {0}")]
    ConcurrentModification(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StateMachineResult<T> = Result<T, StateMachineError>;
