//! # Action Runner
//!
//! Runs one branch's ordered action sequence against one target: parameter
//! resolution, connection executor dispatch, per-attempt result recording,
//! and retry with exponential backoff for transient failures. The runner
//! never touches branch or execution status; it only reports how the
//! sequence ended.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::OrchestrationResult;
use super::types::CancellationFlag;
use crate::config::{ExecutionConfig, RetryConfig};
use crate::connection::{CommandPayload, CommandRequest, ExecutorRegistry};
use crate::credentials::CredentialResolver;
use crate::models::{Action, ActionResult, ActionType, ExecutionBranch, Job, Target};
use crate::repository::OrchestratorRepository;
use crate::state_machine::ActionState;

/// How one branch's action sequence ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionsOutcome {
    /// Every action completed (or was legitimately skipped by a conditional)
    Completed,
    /// At least one action failed; the message is the first failure
    Failed { message: String },
    /// Cancellation was observed at an action boundary
    Cancelled,
}

pub struct ActionRunner {
    repository: Arc<dyn OrchestratorRepository>,
    executors: Arc<ExecutorRegistry>,
    credentials: Arc<dyn CredentialResolver>,
    execution_config: ExecutionConfig,
    retry_config: RetryConfig,
}

impl ActionRunner {
    pub fn new(
        repository: Arc<dyn OrchestratorRepository>,
        executors: Arc<ExecutorRegistry>,
        credentials: Arc<dyn CredentialResolver>,
        execution_config: ExecutionConfig,
        retry_config: RetryConfig,
    ) -> Self {
        Self {
            repository,
            executors,
            credentials,
            execution_config,
            retry_config,
        }
    }

    /// Run the job's actions in order against one target
    ///
    /// Each attempt gets its own result record; retried attempts link back
    /// to the previous one. With `stop_on_failure` unset, later actions run
    /// even after a failure so operators see the full diagnostic picture.
    pub async fn run_actions(
        &self,
        branch: &ExecutionBranch,
        target: &Target,
        job: &Job,
        cancellation: &CancellationFlag,
    ) -> OrchestrationResult<ActionsOutcome> {
        let (method, executor) = match self.executors.select_method(target) {
            Ok(selected) => selected,
            Err(error) => {
                return Ok(ActionsOutcome::Failed {
                    message: error.to_string(),
                })
            }
        };

        let credential = match self.credentials.resolve(&method.credential_ref).await {
            Ok(credential) => credential,
            Err(error) => {
                // Credential trouble is branch-local and never retryable
                return Ok(ActionsOutcome::Failed {
                    message: error.to_string(),
                });
            }
        };

        let mut first_error: Option<String> = None;
        let mut last_output: Option<String> = None;

        for action in &job.actions {
            if cancellation.is_requested() {
                debug!(
                    branch_id = %branch.branch_id,
                    order = action.order,
                    "Cancellation observed at action boundary"
                );
                return Ok(ActionsOutcome::Cancelled);
            }

            match action.action_type {
                ActionType::Wait => {
                    if let Some(message) = self.run_wait_action(branch, action).await? {
                        if first_error.is_none() {
                            first_error = Some(message);
                        }
                        if job.stop_on_failure {
                            break;
                        }
                    }
                }
                ActionType::Conditional => {
                    let matched = self
                        .run_conditional_action(branch, action, last_output.as_deref())
                        .await?;
                    if !matched {
                        // Mismatch ends the branch early without failing it;
                        // remaining actions get no result records.
                        return Ok(match first_error {
                            Some(message) => ActionsOutcome::Failed { message },
                            None => ActionsOutcome::Completed,
                        });
                    }
                }
                ActionType::Command | ActionType::Script | ActionType::FileTransfer => {
                    let payload = match build_payload(action) {
                        Ok(payload) => payload,
                        Err(message) => {
                            self.record_parameter_failure(branch, action, &message).await?;
                            if first_error.is_none() {
                                first_error = Some(message);
                            }
                            if job.stop_on_failure {
                                break;
                            }
                            continue;
                        }
                    };

                    let attempt_outcome = self
                        .run_with_retries(
                            branch,
                            action,
                            target,
                            method,
                            executor.as_ref(),
                            payload,
                            credential.clone(),
                        )
                        .await?;

                    match attempt_outcome {
                        AttemptOutcome::Succeeded { stdout } => {
                            last_output = Some(stdout);
                        }
                        AttemptOutcome::Failed { message } => {
                            last_output = None;
                            if first_error.is_none() {
                                first_error = Some(message);
                            }
                            if job.stop_on_failure {
                                break;
                            }
                        }
                    }
                }
            }
        }

        Ok(match first_error {
            Some(message) => ActionsOutcome::Failed { message },
            None => ActionsOutcome::Completed,
        })
    }

    /// Returns the failure message when the wait could not run
    async fn run_wait_action(
        &self,
        branch: &ExecutionBranch,
        action: &Action,
    ) -> OrchestrationResult<Option<String>> {
        let mut result = ActionResult::started(branch.branch_id, action.action_id, action.order);
        self.repository.insert_action_result(result.clone()).await?;

        let failure = match action.wait_seconds() {
            Some(seconds) => {
                // A wait never outlasts the per-action command timeout
                let bounded = seconds.min(self.execution_config.command_timeout_seconds);
                tokio::time::sleep(Duration::from_secs(bounded)).await;
                result.finalize(
                    ActionState::Completed,
                    Some(format!("waited {bounded}s")),
                    None,
                    None,
                );
                None
            }
            None => {
                let message =
                    format!("wait action {} missing 'seconds' parameter", action.order);
                result.finalize(ActionState::Failed, None, Some(message.clone()), None);
                Some(message)
            }
        };
        self.repository.update_action_result(result).await?;
        Ok(failure)
    }

    /// Returns whether the remaining actions should run
    async fn run_conditional_action(
        &self,
        branch: &ExecutionBranch,
        action: &Action,
        previous_output: Option<&str>,
    ) -> OrchestrationResult<bool> {
        let mut result = ActionResult::started(branch.branch_id, action.action_id, action.order);
        self.repository.insert_action_result(result.clone()).await?;

        let expected = action.expected_output().unwrap_or_default();
        let matched = previous_output
            .map(|output| output.contains(expected))
            .unwrap_or(false);

        if matched {
            result.finalize(
                ActionState::Completed,
                Some(format!("previous output contains '{expected}'")),
                None,
                None,
            );
        } else {
            result.finalize(
                ActionState::Skipped,
                None,
                Some(format!("previous output does not contain '{expected}'")),
                None,
            );
        }
        self.repository.update_action_result(result).await?;
        Ok(matched)
    }

    async fn record_parameter_failure(
        &self,
        branch: &ExecutionBranch,
        action: &Action,
        message: &str,
    ) -> OrchestrationResult<()> {
        let mut result = ActionResult::started(branch.branch_id, action.action_id, action.order);
        self.repository.insert_action_result(result.clone()).await?;
        result.finalize(ActionState::Failed, None, Some(message.to_string()), None);
        self.repository.update_action_result(result).await?;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_with_retries(
        &self,
        branch: &ExecutionBranch,
        action: &Action,
        target: &Target,
        method: &crate::models::CommunicationMethod,
        executor: &dyn crate::connection::ConnectionExecutor,
        payload: CommandPayload,
        credential: crate::credentials::Credential,
    ) -> OrchestrationResult<AttemptOutcome> {
        let max_attempts = if self.retry_config.enable_retry {
            self.retry_config.max_retries + 1
        } else {
            1
        };

        let mut previous: Option<ActionResult> = None;

        for attempt in 1..=max_attempts {
            let mut result =
                ActionResult::started(branch.branch_id, action.action_id, action.order);
            if let Some(previous) = &previous {
                result = result.as_retry_of(previous);
            }
            result.executed_command = Some(payload.describe());
            self.repository.insert_action_result(result.clone()).await?;

            let request = CommandRequest {
                payload: payload.clone(),
                connect_timeout: self.execution_config.connection_timeout(),
                command_timeout: self.execution_config.command_timeout(),
                credential: Some(credential.clone()),
            };

            match executor.execute(target, method, request).await {
                Ok(output) if output.succeeded() => {
                    result.finalize(
                        ActionState::Completed,
                        Some(output.stdout.clone()),
                        none_if_empty(&output.stderr),
                        Some(output.exit_code),
                    );
                    self.repository.update_action_result(result).await?;
                    return Ok(AttemptOutcome::Succeeded {
                        stdout: output.stdout,
                    });
                }
                Ok(output) => {
                    // Non-zero exit is a real command outcome, not transient
                    let message =
                        format!("action {} exited with code {}", action.order, output.exit_code);
                    result.finalize(
                        ActionState::Failed,
                        Some(output.stdout),
                        Some(if output.stderr.is_empty() {
                            message.clone()
                        } else {
                            output.stderr
                        }),
                        Some(output.exit_code),
                    );
                    self.repository.update_action_result(result).await?;
                    return Ok(AttemptOutcome::Failed { message });
                }
                Err(error) => {
                    let message = error.to_string();
                    result.finalize(ActionState::Failed, None, Some(message.clone()), None);
                    self.repository.update_action_result(result.clone()).await?;

                    let retryable = error.is_retryable();
                    if retryable && attempt < max_attempts {
                        let delay = self.retry_config.backoff_delay(attempt);
                        warn!(
                            branch_id = %branch.branch_id,
                            target = %target.name,
                            order = action.order,
                            attempt = attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %message,
                            "Transient action failure, backing off before retry"
                        );
                        tokio::time::sleep(delay).await;
                        previous = Some(result);
                        continue;
                    }
                    return Ok(AttemptOutcome::Failed { message });
                }
            }
        }

        // max_attempts >= 1, so the loop always returns above
        unreachable!("retry loop exited without an outcome")
    }
}

enum AttemptOutcome {
    Succeeded { stdout: String },
    Failed { message: String },
}

fn none_if_empty(text: &str) -> Option<String> {
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Translate an action definition into a connection payload
fn build_payload(action: &Action) -> Result<CommandPayload, String> {
    match action.action_type {
        ActionType::Command => action
            .command()
            .map(|command| CommandPayload::Exec {
                command: command.to_string(),
            })
            .ok_or_else(|| format!("action {} missing 'command' parameter", action.order)),
        ActionType::Script => action
            .script()
            .map(|script| CommandPayload::Exec {
                command: format!(
                    "{interpreter} <<'FLEETOPS_SCRIPT'\n{script}\nFLEETOPS_SCRIPT",
                    interpreter = action.interpreter()
                ),
            })
            .ok_or_else(|| format!("action {} missing 'script' parameter", action.order)),
        ActionType::FileTransfer => action
            .transfer_paths()
            .map(|(source, destination)| CommandPayload::Transfer {
                source: source.to_string(),
                destination: destination.to_string(),
            })
            .ok_or_else(|| {
                format!(
                    "action {} missing 'source' or 'destination' parameter",
                    action.order
                )
            }),
        ActionType::Wait | ActionType::Conditional => {
            Err(format!("action {} has no connection payload", action.order))
        }
    }
}
