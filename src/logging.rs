//! # Structured Logging Module
//!
//! Environment-aware structured logging for debugging concurrent
//! executions: console output with an env-filter, plus helpers that keep
//! field names consistent across orchestrator, reaper, and health monitor
//! log lines.

use std::sync::OnceLock;

use chrono::Utc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let filter = EnvFilter::try_from_env("FLEETOPS_LOG")
            .unwrap_or_else(|_| EnvFilter::new(log_level));

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_filter(filter),
        );

        // A global subscriber may already exist when embedded in a larger
        // process; that is not an error.
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized");
        }

        tracing::info!(
            environment = %environment,
            "Structured logging initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("FLEETOPS_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for execution operations
pub fn log_execution_operation(
    operation: &str,
    execution_id: Option<uuid::Uuid>,
    job_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = execution_id.map(|id| id.to_string()),
        job_name = job_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "EXECUTION_OPERATION"
    );
}

/// Log structured data for branch operations
pub fn log_branch_operation(
    operation: &str,
    execution_id: Option<uuid::Uuid>,
    branch_id: Option<uuid::Uuid>,
    target_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        execution_id = execution_id.map(|id| id.to_string()),
        branch_id = branch_id.map(|id| id.to_string()),
        target_name = target_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "BRANCH_OPERATION"
    );
}

/// Log structured data for health monitor transitions
pub fn log_health_transition(
    target_id: uuid::Uuid,
    from_status: &str,
    to_status: &str,
    consecutive_failures: u32,
    response_time_ms: Option<u64>,
) {
    tracing::info!(
        target_id = %target_id,
        from_status = %from_status,
        to_status = %to_status,
        consecutive_failures = consecutive_failures,
        response_time_ms = response_time_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "HEALTH_TRANSITION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "ERROR"
    );
}
