//! Task domain types
//!
//! A task is the smallest executable unit: one operation against one target
//! database. Tasks are owned by a stage and may depend on sibling tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::engine::{Capability, TargetDatabase};
use crate::domain::role::RoleSpec;

/// Most attempts a task may ask for
pub const MAX_ATTEMPTS: u32 = 100;

/// Longest deadline a task may ask for, one week
pub const MAX_TIMEOUT_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Task execution record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    /// Unique within the owning stage; used by `depends_on`
    pub name: String,
    pub target: TargetDatabase,
    pub payload: TaskPayload,
    pub status: TaskStatus,
    pub depends_on: Vec<String>,
    pub max_attempts: u32,
    pub timeout_seconds: Option<u64>,
    pub attempts: u32,
    pub failure: Option<TaskFailure>,
    pub output: Option<serde_json::Value>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the task to `Running`.
    ///
    /// A task already `Running` is accepted as well: it was left behind by a
    /// previous process and is being re-checked. Returns false for terminal tasks.
    pub fn mark_running(&mut self) -> bool {
        match self.status {
            TaskStatus::Pending | TaskStatus::Running => {
                self.status = TaskStatus::Running;
                self.started_at = Some(Utc::now());
                true
            }
            _ => false,
        }
    }

    /// Applies a terminal outcome. Terminal status is immutable, so this
    /// returns false without touching the task if it already finished.
    pub fn finish(&mut self, outcome: TaskOutcome) -> bool {
        if self.is_terminal() {
            return false;
        }

        match outcome {
            TaskOutcome::Done { output } => {
                self.status = TaskStatus::Done;
                self.output = output;
                self.failure = None;
            }
            TaskOutcome::Failed(failure) => {
                self.status = TaskStatus::Failed;
                self.failure = Some(failure);
            }
            TaskOutcome::Canceled(failure) => {
                self.status = TaskStatus::Canceled;
                self.failure = Some(failure);
            }
        }
        self.completed_at = Some(Utc::now());
        true
    }
}

/// Task execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Done,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Done => "DONE",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskStatus::Pending),
            "RUNNING" => Ok(TaskStatus::Running),
            "DONE" => Ok(TaskStatus::Done),
            "FAILED" => Ok(TaskStatus::Failed),
            "CANCELED" => Ok(TaskStatus::Canceled),
            _ => Err(format!("unknown task status: {}", s)),
        }
    }
}

/// Why a task ended `Failed` or `Canceled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureReason {
    UnsupportedEngine,
    ConnectionError,
    CapabilityNotImplemented,
    ExecutionFailure,
    Timeout,
    DependencyFailed,
    Canceled,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::UnsupportedEngine => "UnsupportedEngine",
            FailureReason::ConnectionError => "ConnectionError",
            FailureReason::CapabilityNotImplemented => "CapabilityNotImplemented",
            FailureReason::ExecutionFailure => "ExecutionFailure",
            FailureReason::Timeout => "Timeout",
            FailureReason::DependencyFailed => "DependencyFailed",
            FailureReason::Canceled => "Canceled",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "UnsupportedEngine" => Ok(FailureReason::UnsupportedEngine),
            "ConnectionError" => Ok(FailureReason::ConnectionError),
            "CapabilityNotImplemented" => Ok(FailureReason::CapabilityNotImplemented),
            "ExecutionFailure" => Ok(FailureReason::ExecutionFailure),
            "Timeout" => Ok(FailureReason::Timeout),
            "DependencyFailed" => Ok(FailureReason::DependencyFailed),
            "Canceled" => Ok(FailureReason::Canceled),
            _ => Err(format!("unknown failure reason: {}", s)),
        }
    }
}

/// Failure detail recorded on a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub reason: FailureReason,
    pub message: String,
}

impl TaskFailure {
    pub fn new(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            reason,
            message: message.into(),
        }
    }
}

/// Terminal outcome produced by the task executor
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Done { output: Option<serde_json::Value> },
    Failed(TaskFailure),
    Canceled(TaskFailure),
}

impl TaskOutcome {
    pub fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        TaskOutcome::Failed(TaskFailure::new(reason, message))
    }

    pub fn canceled(reason: FailureReason, message: impl Into<String>) -> Self {
        TaskOutcome::Canceled(TaskFailure::new(reason, message))
    }
}

/// Operation a task performs against its target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskPayload {
    Migration(MigrationPayload),
    CreateRole { role: RoleSpec },
    UpdateRole { role_name: String, role: RoleSpec },
    FindRole { role_name: String },
    DeleteRole { role_name: String },
}

impl TaskPayload {
    /// The driver capability this payload requires
    pub fn capability(&self) -> Capability {
        match self {
            TaskPayload::Migration(_) => Capability::ExecuteMigration,
            TaskPayload::CreateRole { .. } => Capability::CreateRole,
            TaskPayload::UpdateRole { .. } => Capability::UpdateRole,
            TaskPayload::FindRole { .. } => Capability::FindRole,
            TaskPayload::DeleteRole { .. } => Capability::DeleteRole,
        }
    }
}

/// A migration script to apply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPayload {
    pub statement: String,
    /// Schema version the target reaches once the statement is applied
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<String>,
}

/// Engine-reported effects of a migration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationOutcome {
    pub rows_affected: u64,
    pub schema_version: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::Engine;

    fn task() -> Task {
        Task {
            id: 1,
            name: "add-column".to_string(),
            target: TargetDatabase::new(Engine::Postgres, "postgres://localhost/app"),
            payload: TaskPayload::Migration(MigrationPayload {
                statement: "ALTER TABLE t ADD COLUMN c INT".to_string(),
                schema_version: None,
            }),
            status: TaskStatus::Pending,
            depends_on: vec![],
            max_attempts: 1,
            timeout_seconds: None,
            attempts: 0,
            failure: None,
            output: None,
            started_at: None,
            completed_at: None,
        }
    }

    #[test]
    fn test_terminal_status_is_immutable() {
        let mut task = task();
        assert!(task.mark_running());
        assert!(task.finish(TaskOutcome::Done { output: None }));
        assert_eq!(task.status, TaskStatus::Done);

        assert!(!task.finish(TaskOutcome::failed(FailureReason::Timeout, "late")));
        assert_eq!(task.status, TaskStatus::Done);
        assert!(task.failure.is_none());
        assert!(!task.mark_running());
    }

    #[test]
    fn test_failed_task_records_reason() {
        let mut task = task();
        task.mark_running();
        task.finish(TaskOutcome::failed(
            FailureReason::CapabilityNotImplemented,
            "create role for ClickHouse is not implemented yet",
        ));

        assert_eq!(task.status, TaskStatus::Failed);
        let failure = task.failure.unwrap();
        assert_eq!(failure.reason, FailureReason::CapabilityNotImplemented);
        assert!(task.completed_at.is_some());
    }

    #[test]
    fn test_payload_wire_format() {
        let payload: TaskPayload = serde_json::from_value(serde_json::json!({
            "kind": "create_role",
            "role": { "name": "reader" }
        }))
        .unwrap();

        assert_eq!(payload.capability(), Capability::CreateRole);

        let payload: TaskPayload = serde_json::from_value(serde_json::json!({
            "kind": "migration",
            "statement": "CREATE TABLE t (id INT)"
        }))
        .unwrap();
        assert_eq!(payload.capability(), Capability::ExecuteMigration);
    }

    #[test]
    fn test_status_strings() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Done,
            TaskStatus::Failed,
            TaskStatus::Canceled,
        ] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert_eq!(
            "DependencyFailed".parse::<FailureReason>().unwrap(),
            FailureReason::DependencyFailed
        );
    }
}
