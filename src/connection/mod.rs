//! # Connection Executors
//!
//! A [`ConnectionExecutor`] opens a connection to one target, runs one
//! command, and returns output, exit code, and timing within the bounds
//! supplied by the caller. One implementation exists per protocol family;
//! implementations are selected through the [`registry::ExecutorRegistry`]
//! keyed by [`ProtocolKind`] at startup.

pub mod local;
pub mod registry;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::credentials::Credential;
use crate::models::{CommunicationMethod, ProtocolKind, Target};

pub use local::LocalProcessExecutor;
pub use registry::ExecutorRegistry;

/// Connection-level errors, local to one branch
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("Failed to connect to {target}: {reason}")]
    ConnectFailed { target: String, reason: String },

    #[error("Command timed out after {timeout:?}")]
    CommandTimeout { timeout: Duration },

    #[error("Credential '{0}' not found")]
    CredentialNotFound(String),

    #[error("No executor registered for protocol '{0}'")]
    ExecutorNotRegistered(ProtocolKind),

    #[error("Command failed: {0}")]
    CommandFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConnectionError {
    /// Timeouts and connect failures are transient enough to retry;
    /// everything else fails the attempt permanently.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::CommandTimeout { .. } | Self::ConnectFailed { .. }
        )
    }
}

/// What to run on the target
#[derive(Debug, Clone)]
pub enum CommandPayload {
    /// A shell command line
    Exec { command: String },
    /// Copy a file onto the target
    Transfer { source: String, destination: String },
}

impl CommandPayload {
    /// Human-readable form recorded as the executed command
    pub fn describe(&self) -> String {
        match self {
            Self::Exec { command } => command.clone(),
            Self::Transfer {
                source,
                destination,
            } => format!("copy {source} -> {destination}"),
        }
    }
}

/// One bounded command invocation against one target
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub payload: CommandPayload,
    /// Bound on connection establishment, distinct from command runtime
    pub connect_timeout: Duration,
    /// Bound on command execution once connected
    pub command_timeout: Duration,
    pub credential: Option<Credential>,
}

impl CommandRequest {
    pub fn exec(command: impl Into<String>) -> Self {
        Self {
            payload: CommandPayload::Exec {
                command: command.into(),
            },
            connect_timeout: Duration::from_secs(30),
            command_timeout: Duration::from_secs(300),
            credential: None,
        }
    }

    pub fn with_timeouts(mut self, connect: Duration, command: Duration) -> Self {
        self.connect_timeout = connect;
        self.command_timeout = command;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }
}

/// Captured output of one command invocation
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration: Duration,
}

impl CommandOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Capability interface for one protocol family
#[async_trait]
pub trait ConnectionExecutor: Send + Sync {
    /// Protocol this executor serves
    fn protocol(&self) -> ProtocolKind;

    /// Open a connection and run one command within the request's bounds
    async fn execute(
        &self,
        target: &Target,
        method: &CommunicationMethod,
        request: CommandRequest,
    ) -> Result<CommandOutput, ConnectionError>;

    /// Lightweight reachability probe returning observed latency
    ///
    /// Default implementation runs a no-op command under the probe timeout.
    async fn probe(
        &self,
        target: &Target,
        method: &CommunicationMethod,
        timeout: Duration,
    ) -> Result<Duration, ConnectionError> {
        let request = CommandRequest::exec("true").with_timeouts(timeout, timeout);
        let output = self.execute(target, method, request).await?;
        if output.succeeded() {
            Ok(output.duration)
        } else {
            Err(ConnectionError::CommandFailed(format!(
                "probe exited with code {}",
                output.exit_code
            )))
        }
    }
}
