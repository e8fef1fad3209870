use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::HealthConfig;
use crate::connection::ExecutorRegistry;
use crate::events::publisher::EventPublisher;
use crate::logging::log_health_transition;
use crate::models::{Target, TargetHealthState, TargetRegistry};
use crate::orchestration::errors::{OrchestrationError, OrchestrationResult};
use crate::repository::OrchestratorRepository;
use crate::state_machine::HealthStatus;

/// What one monitoring pass did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProbeReport {
    /// Targets newly brought under tracking this pass
    pub newly_tracked: usize,
    /// Probes actually sent
    pub probed: usize,
    /// Probes whose classification changed the target's status
    pub transitions: usize,
}

/// Observation from one probe, reduced to what classification needs
#[derive(Debug, Clone)]
enum ProbeObservation {
    /// Probe succeeded with the given latency
    Responded { latency_ms: u64 },
    /// Probe failed or timed out
    Unreachable { reason: String },
}

pub struct TargetHealthMonitor {
    repository: Arc<dyn OrchestratorRepository>,
    target_registry: Arc<dyn TargetRegistry>,
    executors: Arc<ExecutorRegistry>,
    event_publisher: EventPublisher,
    config: HealthConfig,
}

impl TargetHealthMonitor {
    pub fn new(
        repository: Arc<dyn OrchestratorRepository>,
        target_registry: Arc<dyn TargetRegistry>,
        executors: Arc<ExecutorRegistry>,
        event_publisher: EventPublisher,
        config: HealthConfig,
    ) -> Self {
        Self {
            repository,
            target_registry,
            executors,
            event_publisher,
            config,
        }
    }

    /// Bring every registered target under tracking
    ///
    /// New targets start unknown with a probe due immediately.
    pub async fn ensure_tracked(&self) -> OrchestrationResult<usize> {
        let mut newly_tracked = 0;
        for target in self.target_registry.list_targets().await? {
            if self
                .repository
                .fetch_health_state(target.target_id)
                .await?
                .is_none()
            {
                self.repository
                    .upsert_health_state(TargetHealthState::untracked(
                        target.target_id,
                        target.environment,
                    ))
                    .await?;
                newly_tracked += 1;
            }
        }
        Ok(newly_tracked)
    }

    /// One monitoring pass: track new targets, probe everything due
    pub async fn run_due_probes(&self) -> OrchestrationResult<ProbeReport> {
        let mut report = ProbeReport {
            newly_tracked: self.ensure_tracked().await?,
            ..ProbeReport::default()
        };

        for state in self.repository.health_states_due(Utc::now()).await? {
            let Some(target) = self.target_registry.fetch_target(state.target_id).await? else {
                warn!(
                    target_id = %state.target_id,
                    "Tracked target no longer in registry, skipping probe"
                );
                continue;
            };

            let previous = state.status;
            let updated = self.probe_target(&target).await?;
            report.probed += 1;
            if updated.status != previous {
                report.transitions += 1;
            }
        }

        Ok(report)
    }

    /// Probe one target now and persist the reclassified state
    pub async fn probe_target(&self, target: &Target) -> OrchestrationResult<TargetHealthState> {
        let observation = match self.executors.select_method(target) {
            Ok((method, executor)) => {
                let timeout = self.config.probe_timeout(method.protocol);
                match executor.probe(target, method, timeout).await {
                    Ok(latency) => ProbeObservation::Responded {
                        latency_ms: latency.as_millis() as u64,
                    },
                    Err(error) => ProbeObservation::Unreachable {
                        reason: error.to_string(),
                    },
                }
            }
            Err(error) => ProbeObservation::Unreachable {
                reason: error.to_string(),
            },
        };

        let mut state = self
            .repository
            .fetch_health_state(target.target_id)
            .await?
            .unwrap_or_else(|| {
                TargetHealthState::untracked(target.target_id, target.environment)
            });

        let now = Utc::now();
        let previous = state.status;
        apply_observation(&mut state, &observation, &self.config, now);

        if state.status != previous {
            log_health_transition(
                target.target_id,
                &previous.to_string(),
                &state.status.to_string(),
                state.consecutive_failures,
                state.last_response_time_ms,
            );
            self.event_publisher
                .publish(
                    "health.transitioned",
                    serde_json::json!({
                        "target_id": target.target_id,
                        "from": previous,
                        "to": state.status,
                        "consecutive_failures": state.consecutive_failures,
                    }),
                )
                .await
                .ok();
        } else {
            debug!(
                target = %target.name,
                status = %state.status,
                "Probe kept target classification"
            );
        }

        self.repository.upsert_health_state(state.clone()).await?;
        Ok(state)
    }

    /// Current classification for one target
    pub async fn health_of(&self, target_id: Uuid) -> OrchestrationResult<TargetHealthState> {
        self.repository
            .fetch_health_state(target_id)
            .await?
            .ok_or(OrchestrationError::TargetNotFound(target_id))
    }
}

/// Fold one probe observation into the rolling health state
///
/// Escalation is driven by consecutive failures against the warning and
/// critical thresholds. Recovery from a degraded status needs
/// `recovery_count` consecutive successes, each within the warning latency
/// bound; a slow success resets that run. An unknown target is trusted
/// after a single fast success.
fn apply_observation(
    state: &mut TargetHealthState,
    observation: &ProbeObservation,
    config: &HealthConfig,
    now: DateTime<Utc>,
) {
    match observation {
        ProbeObservation::Responded { latency_ms } => {
            state.consecutive_failures = 0;
            state.last_response_time_ms = Some(*latency_ms);

            if *latency_ms >= config.critical_latency_ms {
                state.consecutive_successes = 0;
                state.status = HealthStatus::Critical;
            } else if *latency_ms >= config.warning_latency_ms {
                state.consecutive_successes = 0;
                if state.status != HealthStatus::Critical {
                    state.status = HealthStatus::Warning;
                }
            } else {
                state.consecutive_successes += 1;
                match state.status {
                    HealthStatus::Unknown => state.status = HealthStatus::Healthy,
                    HealthStatus::Warning | HealthStatus::Critical => {
                        if state.consecutive_successes >= config.recovery_count {
                            state.status = HealthStatus::Healthy;
                        }
                    }
                    HealthStatus::Healthy => {}
                }
            }
        }
        ProbeObservation::Unreachable { .. } => {
            state.consecutive_successes = 0;
            state.consecutive_failures += 1;

            if state.consecutive_failures >= config.critical_threshold {
                state.status = HealthStatus::Critical;
            } else if state.consecutive_failures >= config.warning_threshold {
                state.status = HealthStatus::Warning;
            }
        }
    }

    state.last_checked_at = Some(now);
    let interval = config.interval_for(state.environment, state.status);
    state.next_check_due_at = now
        + ChronoDuration::from_std(interval).unwrap_or_else(|_| ChronoDuration::seconds(60));
}
