//! Stage domain types

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::task::{Task, TaskStatus};

/// One phase of a pipeline, typically mapped to a deployment environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage {
    pub id: i64,
    /// Ordinal position within the pipeline, starting at 0
    pub position: u32,
    pub name: String,
    pub tasks: Vec<Task>,
}

impl Stage {
    /// Aggregate status derived from the stage's tasks
    pub fn status(&self) -> StageStatus {
        StageStatus::aggregate(self.tasks.iter().map(|t| t.status))
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Aggregate stage status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
}

impl StageStatus {
    /// Folds task statuses into a stage status.
    ///
    /// A stage with no tasks has nothing left to do and counts as succeeded.
    pub fn aggregate(statuses: impl IntoIterator<Item = TaskStatus>) -> Self {
        let mut all_done = true;
        let mut all_pending = true;
        let mut all_terminal = true;
        let mut any_failed = false;

        for status in statuses {
            all_done &= status == TaskStatus::Done;
            all_pending &= status == TaskStatus::Pending;
            all_terminal &= status.is_terminal();
            any_failed |= status == TaskStatus::Failed;
        }

        if all_done {
            StageStatus::Succeeded
        } else if !all_terminal {
            if all_pending {
                StageStatus::Pending
            } else {
                StageStatus::Running
            }
        } else if any_failed {
            StageStatus::Failed
        } else {
            StageStatus::Canceled
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StageStatus::Succeeded | StageStatus::Failed | StageStatus::Canceled
        )
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageStatus::Pending => write!(f, "Pending"),
            StageStatus::Running => write!(f, "Running"),
            StageStatus::Succeeded => write!(f, "Succeeded"),
            StageStatus::Failed => write!(f, "Failed"),
            StageStatus::Canceled => write!(f, "Canceled"),
        }
    }
}
