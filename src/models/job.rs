//! # Job Definitions
//!
//! A job is a reusable, ordered sequence of actions run against a set of
//! targets. Definitions are owned by the job store; the orchestrator only
//! reads them and never mutates a definition during a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

/// Kind of work one action performs on a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Run a single shell command
    Command,
    /// Run a multi-line script through an interpreter
    Script,
    /// Copy a file to the target
    FileTransfer,
    /// Pause the branch for a number of seconds
    Wait,
    /// Gate the remaining actions on the previous action's output
    Conditional,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command => write!(f, "command"),
            Self::Script => write!(f, "script"),
            Self::FileTransfer => write!(f, "file_transfer"),
            Self::Wait => write!(f, "wait"),
            Self::Conditional => write!(f, "conditional"),
        }
    }
}

/// One step of a job
///
/// `order` is 1-based and contiguous within a job; branches execute actions
/// strictly in ascending order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub action_id: Uuid,
    pub order: i32,
    pub action_type: ActionType,
    /// Type-specific parameters, e.g. `{"command": "uptime"}` for
    /// [`ActionType::Command`] or `{"seconds": 5}` for [`ActionType::Wait`]
    pub parameters: Value,
    /// Marks an action that mutates target state in a risky way
    pub is_dangerous: bool,
    /// Dangerous actions with this flag need an explicit confirmation token
    /// before any branch starts
    pub requires_confirmation: bool,
}

impl Action {
    pub fn new(order: i32, action_type: ActionType, parameters: Value) -> Self {
        Self {
            action_id: Uuid::new_v4(),
            order,
            action_type,
            parameters,
            is_dangerous: false,
            requires_confirmation: false,
        }
    }

    pub fn dangerous(mut self, requires_confirmation: bool) -> Self {
        self.is_dangerous = true;
        self.requires_confirmation = requires_confirmation;
        self
    }

    /// Shell command for command actions
    pub fn command(&self) -> Option<&str> {
        self.parameters.get("command").and_then(Value::as_str)
    }

    /// Script body for script actions
    pub fn script(&self) -> Option<&str> {
        self.parameters.get("script").and_then(Value::as_str)
    }

    /// Interpreter for script actions, defaulting to `sh`
    pub fn interpreter(&self) -> &str {
        self.parameters
            .get("interpreter")
            .and_then(Value::as_str)
            .unwrap_or("sh")
    }

    /// Source and destination for file-transfer actions
    pub fn transfer_paths(&self) -> Option<(&str, &str)> {
        let source = self.parameters.get("source").and_then(Value::as_str)?;
        let destination = self.parameters.get("destination").and_then(Value::as_str)?;
        Some((source, destination))
    }

    /// Pause duration for wait actions
    pub fn wait_seconds(&self) -> Option<u64> {
        self.parameters.get("seconds").and_then(Value::as_u64)
    }

    /// Expected substring for conditional actions
    pub fn expected_output(&self) -> Option<&str> {
        self.parameters
            .get("expect_contains")
            .and_then(Value::as_str)
    }
}

/// Recurrence configuration for scheduled jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    /// Seconds between triggered runs
    pub interval_seconds: u64,
}

/// Who or what triggered an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    Manual,
    Schedule,
    Api,
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Schedule => write!(f, "schedule"),
            Self::Api => write!(f, "api"),
        }
    }
}

/// Administrator-defined job: ordered actions against a target set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub name: String,
    pub actions: Vec<Action>,
    pub target_ids: Vec<Uuid>,
    pub schedule: Option<RecurrenceRule>,
    pub created_by: Option<String>,
    /// Abort remaining actions on a branch after the first failure instead
    /// of continuing for diagnostic completeness
    pub stop_on_failure: bool,
    /// Soft-delete marker; deleted jobs are never dispatched
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

impl Job {
    pub fn new(name: impl Into<String>, actions: Vec<Action>, target_ids: Vec<Uuid>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            name: name.into(),
            actions,
            target_ids,
            schedule: None,
            created_by: None,
            stop_on_failure: false,
            deleted: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_schedule(mut self, interval_seconds: u64) -> Self {
        self.schedule = Some(RecurrenceRule { interval_seconds });
        self
    }

    pub fn with_stop_on_failure(mut self) -> Self {
        self.stop_on_failure = true;
        self
    }

    /// Validate that the action list is non-empty with contiguous 1-based order
    pub fn validate(&self) -> Result<(), String> {
        if self.deleted {
            return Err(format!("job '{}' is deleted", self.name));
        }
        if self.actions.is_empty() {
            return Err(format!("job '{}' has no actions", self.name));
        }
        for (index, action) in self.actions.iter().enumerate() {
            let expected = i32::try_from(index).unwrap_or(i32::MAX) + 1;
            if action.order != expected {
                return Err(format!(
                    "job '{}' action order {} found where {} expected",
                    self.name, action.order, expected
                ));
            }
        }
        Ok(())
    }

    /// Actions that need an explicit confirmation token before dispatch
    pub fn confirmation_required_actions(&self) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|action| action.is_dangerous && action.requires_confirmation)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn command_action(order: i32, command: &str) -> Action {
        Action::new(order, ActionType::Command, json!({ "command": command }))
    }

    #[test]
    fn test_validate_accepts_contiguous_orders() {
        let job = Job::new(
            "restart-nginx",
            vec![command_action(1, "systemctl stop nginx"), command_action(2, "systemctl start nginx")],
            vec![Uuid::new_v4()],
        );
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_and_gapped_jobs() {
        let empty = Job::new("noop", vec![], vec![Uuid::new_v4()]);
        assert!(empty.validate().is_err());

        let gapped = Job::new(
            "gapped",
            vec![command_action(1, "true"), command_action(3, "true")],
            vec![Uuid::new_v4()],
        );
        assert!(gapped.validate().is_err());

        let deleted = {
            let mut job = Job::new("gone", vec![command_action(1, "true")], vec![]);
            job.deleted = true;
            job
        };
        assert!(deleted.validate().is_err());
    }

    #[test]
    fn test_parameter_accessors() {
        let action = Action::new(
            1,
            ActionType::Script,
            json!({ "script": "echo hi", "interpreter": "bash" }),
        );
        assert_eq!(action.script(), Some("echo hi"));
        assert_eq!(action.interpreter(), "bash");

        let wait = Action::new(2, ActionType::Wait, json!({ "seconds": 5 }));
        assert_eq!(wait.wait_seconds(), Some(5));

        let transfer = Action::new(
            3,
            ActionType::FileTransfer,
            json!({ "source": "/tmp/a", "destination": "/tmp/b" }),
        );
        assert_eq!(transfer.transfer_paths(), Some(("/tmp/a", "/tmp/b")));
    }

    #[test]
    fn test_confirmation_required_actions() {
        let job = Job::new(
            "wipe-cache",
            vec![
                command_action(1, "true"),
                Action::new(2, ActionType::Command, json!({ "command": "rm -rf /var/cache/app" }))
                    .dangerous(true),
            ],
            vec![Uuid::new_v4()],
        );
        let required = job.confirmation_required_actions();
        assert_eq!(required.len(), 1);
        assert_eq!(required[0].order, 2);
    }
}
