//! # Configuration System
//!
//! Environment-provided configuration for the orchestration core. Values
//! come from an optional config file merged with `FLEETOPS_`-prefixed
//! environment variables; every field carries the documented default so a
//! bare environment works out of the box.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::models::{ProtocolKind, TargetEnvironment};
use crate::state_machine::HealthStatus;

/// Configuration loading and validation errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration error: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Root configuration for the orchestration core
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub execution: ExecutionConfig,
    pub retry: RetryConfig,
    pub reaper: ReaperConfig,
    pub health: HealthConfig,
    pub dispatch: DispatchConfig,
}

impl FleetConfig {
    /// Load configuration from `fleetops.*` in the working directory (if
    /// present) merged with `FLEETOPS_`-prefixed environment variables
    pub fn load() -> Result<Self, ConfigurationError> {
        Self::load_from(None)
    }

    /// Load configuration from an explicit file path plus environment
    /// overrides
    pub fn load_from(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();
        builder = match path {
            Some(path) => builder.add_source(config::File::from(path)),
            None => builder.add_source(config::File::with_name("fleetops").required(false)),
        };
        builder = builder
            .add_source(config::Environment::with_prefix("FLEETOPS").separator("__"));

        let loaded: FleetConfig = builder.build()?.try_deserialize()?;
        loaded.validate()?;
        Ok(loaded)
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.execution.max_concurrent_targets == 0 {
            return Err(ConfigurationError::Invalid(
                "max_concurrent_targets must be at least 1".to_string(),
            ));
        }
        if self.dispatch.worker_count == 0 {
            return Err(ConfigurationError::Invalid(
                "dispatch worker_count must be at least 1".to_string(),
            ));
        }
        if self.retry.backoff_base <= 0.0 {
            return Err(ConfigurationError::Invalid(
                "retry backoff_base must be positive".to_string(),
            ));
        }
        if self.reaper.stale_runtime_hours <= 0 {
            return Err(ConfigurationError::Invalid(
                "stale_runtime_hours must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Fan-out and timeout settings for job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Ceiling on simultaneous in-flight branches system-wide
    pub max_concurrent_targets: usize,
    /// Bound on connection establishment per attempt
    pub connection_timeout_seconds: u64,
    /// Bound on command execution per attempt
    pub command_timeout_seconds: u64,
    /// Ceiling on simultaneously running executions
    pub max_running_executions: usize,
    /// Exclude targets currently marked critical from new fan-outs
    pub skip_critical_targets: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_concurrent_targets: 20,
            connection_timeout_seconds: 30,
            command_timeout_seconds: 300,
            max_running_executions: 50,
            skip_critical_targets: false,
        }
    }
}

impl ExecutionConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout_seconds)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_seconds)
    }
}

/// Retry policy for transient action failures
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub enable_retry: bool,
    pub max_retries: u32,
    /// Exponential backoff base; the delay before attempt N is base^N seconds
    pub backoff_base: f64,
    pub backoff_max_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            enable_retry: true,
            max_retries: 3,
            backoff_base: 2.0,
            backoff_max_seconds: 300,
        }
    }
}

impl RetryConfig {
    /// Backoff delay before retry attempt `attempt` (1-based), capped
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let attempt = i32::try_from(attempt).unwrap_or(i32::MAX);
        let seconds = self.backoff_base.powi(attempt);
        let capped = seconds.min(self.backoff_max_seconds as f64).max(0.0);
        Duration::from_secs_f64(capped)
    }
}

/// Stale-execution reaper settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaperConfig {
    /// Runtime ceiling after which a running branch is deemed stale
    pub stale_runtime_hours: i64,
    /// Cadence of the periodic sweep
    pub sweep_interval_seconds: u64,
}

impl Default for ReaperConfig {
    fn default() -> Self {
        Self {
            stale_runtime_hours: 24,
            sweep_interval_seconds: 300,
        }
    }
}

/// Probe cadence for one environment, per health status
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthIntervals {
    pub healthy_seconds: u64,
    pub warning_seconds: u64,
    pub critical_seconds: u64,
    pub unknown_seconds: u64,
}

impl Default for HealthIntervals {
    fn default() -> Self {
        Self {
            healthy_seconds: 300,
            warning_seconds: 120,
            critical_seconds: 60,
            unknown_seconds: 60,
        }
    }
}

impl HealthIntervals {
    pub fn for_status(&self, status: HealthStatus) -> Duration {
        let seconds = match status {
            HealthStatus::Healthy => self.healthy_seconds,
            HealthStatus::Warning => self.warning_seconds,
            HealthStatus::Critical => self.critical_seconds,
            HealthStatus::Unknown => self.unknown_seconds,
        };
        Duration::from_secs(seconds)
    }
}

/// Target health monitoring thresholds and cadence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures before escalating to warning
    pub warning_threshold: u32,
    /// Consecutive failures before escalating to critical
    pub critical_threshold: u32,
    /// Consecutive successes required before recovering to healthy
    pub recovery_count: u32,
    /// Latency bound above which a successful probe still counts as degraded
    pub warning_latency_ms: u64,
    pub critical_latency_ms: u64,
    /// Per-environment probe cadence; unlisted environments use defaults
    pub intervals: HashMap<TargetEnvironment, HealthIntervals>,
    /// Per-protocol probe timeout in seconds
    pub probe_timeout_seconds: HashMap<ProtocolKind, u64>,
    pub default_probe_timeout_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        let mut intervals = HashMap::new();
        intervals.insert(
            TargetEnvironment::Production,
            HealthIntervals {
                healthy_seconds: 300,
                warning_seconds: 120,
                critical_seconds: 60,
                unknown_seconds: 60,
            },
        );
        intervals.insert(
            TargetEnvironment::Staging,
            HealthIntervals {
                healthy_seconds: 600,
                warning_seconds: 300,
                critical_seconds: 120,
                unknown_seconds: 120,
            },
        );
        intervals.insert(
            TargetEnvironment::Development,
            HealthIntervals {
                healthy_seconds: 900,
                warning_seconds: 600,
                critical_seconds: 300,
                unknown_seconds: 300,
            },
        );
        intervals.insert(
            TargetEnvironment::Test,
            HealthIntervals {
                healthy_seconds: 60,
                warning_seconds: 30,
                critical_seconds: 15,
                unknown_seconds: 15,
            },
        );

        Self {
            warning_threshold: 3,
            critical_threshold: 5,
            recovery_count: 2,
            warning_latency_ms: 2_000,
            critical_latency_ms: 10_000,
            intervals,
            probe_timeout_seconds: HashMap::new(),
            default_probe_timeout_seconds: 10,
        }
    }
}

impl HealthConfig {
    /// Probe interval for one environment at one health status
    pub fn interval_for(&self, environment: TargetEnvironment, status: HealthStatus) -> Duration {
        self.intervals
            .get(&environment)
            .copied()
            .unwrap_or_default()
            .for_status(status)
    }

    /// Probe timeout for one protocol
    pub fn probe_timeout(&self, protocol: ProtocolKind) -> Duration {
        let seconds = self
            .probe_timeout_seconds
            .get(&protocol)
            .copied()
            .unwrap_or(self.default_probe_timeout_seconds);
        Duration::from_secs(seconds)
    }
}

/// Dispatch queue worker pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of queue workers pulling work items
    pub worker_count: usize,
    /// Bound on queued-but-unclaimed work items
    pub queue_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            worker_count: 8,
            queue_depth: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = FleetConfig::default();
        assert_eq!(config.execution.max_concurrent_targets, 20);
        assert_eq!(config.execution.connection_timeout_seconds, 30);
        assert_eq!(config.execution.command_timeout_seconds, 300);
        assert!(config.retry.enable_retry);
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.backoff_base, 2.0);
        assert_eq!(config.reaper.stale_runtime_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_delay_is_exponential_and_capped() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(retry.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(retry.backoff_delay(3), Duration::from_secs(8));
        // 2^10 = 1024s gets capped at 300s
        assert_eq!(retry.backoff_delay(10), Duration::from_secs(300));
    }

    #[test]
    fn test_health_intervals_tighten_as_health_degrades() {
        let health = HealthConfig::default();
        let healthy = health.interval_for(TargetEnvironment::Production, HealthStatus::Healthy);
        let warning = health.interval_for(TargetEnvironment::Production, HealthStatus::Warning);
        let critical = health.interval_for(TargetEnvironment::Production, HealthStatus::Critical);
        assert!(healthy > warning);
        assert!(warning > critical);
    }

    #[test]
    fn test_probe_timeout_falls_back_to_default() {
        let mut health = HealthConfig::default();
        health.probe_timeout_seconds.insert(ProtocolKind::Ssh, 5);
        assert_eq!(health.probe_timeout(ProtocolKind::Ssh), Duration::from_secs(5));
        assert_eq!(
            health.probe_timeout(ProtocolKind::WinRm),
            Duration::from_secs(10)
        );
    }

    #[test]
    fn test_validation_rejects_zero_concurrency() {
        let mut config = FleetConfig::default();
        config.execution.max_concurrent_targets = 0;
        assert!(config.validate().is_err());
    }
}
