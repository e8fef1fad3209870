//! # Target Health State
//!
//! Rolling health record per target, mutated only by the health monitor
//! and read by the orchestrator to skip clearly-critical targets when
//! configured to do so.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::target::TargetEnvironment;
use crate::state_machine::HealthStatus;

/// Rolling health state for one target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetHealthState {
    pub target_id: Uuid,
    pub environment: TargetEnvironment,
    pub status: HealthStatus,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    /// Latency of the most recent successful probe
    pub last_response_time_ms: Option<u64>,
    pub last_checked_at: Option<DateTime<Utc>>,
    /// Due time for the next probe; the cadence tightens as health degrades
    pub next_check_due_at: DateTime<Utc>,
}

impl TargetHealthState {
    /// Initial state for a newly tracked target: unknown, due immediately
    pub fn untracked(target_id: Uuid, environment: TargetEnvironment) -> Self {
        Self {
            target_id,
            environment,
            status: HealthStatus::Unknown,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_response_time_ms: None,
            last_checked_at: None,
            next_check_due_at: Utc::now(),
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_check_due_at <= now
    }
}
