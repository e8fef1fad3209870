//! Local process executor
//!
//! Runs commands as child processes on the orchestrator host through
//! `sh -c`, with the command timeout enforced by killing the child. Used
//! for targets that represent the local machine and as the reference
//! executor implementation for the protocol seam.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use super::{
    CommandOutput, CommandPayload, CommandRequest, ConnectionError, ConnectionExecutor,
};
use crate::models::{CommunicationMethod, ProtocolKind, Target};

/// Connection executor for [`ProtocolKind::Local`]
#[derive(Debug, Default)]
pub struct LocalProcessExecutor {
    working_dir: Option<String>,
}

impl LocalProcessExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_working_dir(working_dir: impl Into<String>) -> Self {
        Self {
            working_dir: Some(working_dir.into()),
        }
    }

    async fn run_shell(
        &self,
        command: &str,
        command_timeout: Duration,
    ) -> Result<CommandOutput, ConnectionError> {
        let started = Instant::now();

        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command);
        shell.stdout(Stdio::piped()).stderr(Stdio::piped());
        shell.kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            shell.current_dir(dir);
        }

        let child = shell.spawn()?;
        let output = match timeout(command_timeout, child.wait_with_output()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ConnectionError::CommandTimeout {
                    timeout: command_timeout,
                })
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: started.elapsed(),
        })
    }
}

#[async_trait]
impl ConnectionExecutor for LocalProcessExecutor {
    fn protocol(&self) -> ProtocolKind {
        ProtocolKind::Local
    }

    async fn execute(
        &self,
        target: &Target,
        _method: &CommunicationMethod,
        request: CommandRequest,
    ) -> Result<CommandOutput, ConnectionError> {
        debug!(
            target = %target.name,
            command = %request.payload.describe(),
            "Executing local command"
        );

        match &request.payload {
            CommandPayload::Exec { command } => {
                self.run_shell(command, request.command_timeout).await
            }
            CommandPayload::Transfer {
                source,
                destination,
            } => {
                let started = Instant::now();
                match timeout(
                    request.command_timeout,
                    tokio::fs::copy(source, destination),
                )
                .await
                {
                    Ok(Ok(bytes)) => Ok(CommandOutput {
                        stdout: format!("{bytes} bytes copied"),
                        stderr: String::new(),
                        exit_code: 0,
                        duration: started.elapsed(),
                    }),
                    Ok(Err(error)) => Err(ConnectionError::Io(error)),
                    Err(_) => Err(ConnectionError::CommandTimeout {
                        timeout: request.command_timeout,
                    }),
                }
            }
        }
    }
}
