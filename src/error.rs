//! Crate-level error type aggregating component errors

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::connection::ConnectionError;
use crate::credentials::CredentialError;
use crate::dispatch::DispatchError;
use crate::orchestration::OrchestrationError;
use crate::repository::RepositoryError;
use crate::state_machine::StateMachineError;

/// Top-level error for embedders that want a single error surface
#[derive(Debug, Error)]
pub enum FleetError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error(transparent)]
    Orchestration(#[from] OrchestrationError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

pub type FleetResult<T> = Result<T, FleetError>;
