//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::stage::{Stage, StageStatus};
use crate::domain::task::{Task, TaskStatus};

/// Aggregate root of a change request
///
/// Owns its stages, which own their tasks. Mutated only by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: i64,
    pub name: String,
    /// Opaque subject id of the creator, assigned from the caller's identity
    pub creator_id: i64,
    pub status: PipelineStatus,
    pub cancel_requested: bool,
    pub stages: Vec<Stage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Pipeline {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Index of the lowest-ordinal stage that has not succeeded yet
    pub fn next_stage(&self) -> Option<usize> {
        self.stages
            .iter()
            .position(|s| s.status() != StageStatus::Succeeded)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stages.iter().flat_map(|s| s.tasks.iter())
    }

    /// Copy with every task DSN redacted, for showing outside the orchestrator
    pub fn redacted(&self) -> Self {
        let mut pipeline = self.clone();
        for task in pipeline.stages.iter_mut().flat_map(|s| s.tasks.iter_mut()) {
            task.target.connection.dsn = task.target.connection.redacted();
        }
        pipeline
    }

    /// Moves an open pipeline to a terminal status.
    ///
    /// Status transitions are monotone; returns false if the pipeline was
    /// already terminal or `status` is `Open`.
    pub fn transition(&mut self, status: PipelineStatus) -> bool {
        if self.is_terminal() || status == PipelineStatus::Open {
            return false;
        }
        self.status = status;
        self.updated_at = Utc::now();
        true
    }

    /// Checks the status invariants of the aggregate
    pub fn check_invariants(&self) -> Result<(), String> {
        match self.status {
            PipelineStatus::Done => {
                if let Some(task) = self.tasks().find(|t| t.status != TaskStatus::Done) {
                    return Err(format!(
                        "pipeline {} is DONE but task '{}' is {}",
                        self.id, task.name, task.status
                    ));
                }
            }
            PipelineStatus::Canceled => {
                let stopped = self
                    .tasks()
                    .any(|t| matches!(t.status, TaskStatus::Failed | TaskStatus::Canceled));
                if !stopped && !self.cancel_requested {
                    return Err(format!(
                        "pipeline {} is CANCELED without a failed task or cancel request",
                        self.id
                    ));
                }
            }
            PipelineStatus::Open => {}
        }

        for pair in self.stages.windows(2) {
            let later_started = pair[1].tasks.iter().any(|t| t.status != TaskStatus::Pending);
            if later_started && pair[0].status() != StageStatus::Succeeded {
                return Err(format!(
                    "stage '{}' started before stage '{}' succeeded",
                    pair[1].name, pair[0].name
                ));
            }
        }

        Ok(())
    }
}

/// Pipeline lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStatus {
    Open,
    Done,
    Canceled,
}

impl PipelineStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PipelineStatus::Open)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStatus::Open => "OPEN",
            PipelineStatus::Done => "DONE",
            PipelineStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(PipelineStatus::Open),
            "DONE" => Ok(PipelineStatus::Done),
            "CANCELED" => Ok(PipelineStatus::Canceled),
            _ => Err(format!("unknown pipeline status: {}", s)),
        }
    }
}

/// Read-side filter for pipelines
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineFind {
    pub id: Option<i64>,
    /// `true` matches `OPEN` pipelines, `false` matches terminal ones
    pub active: Option<bool>,
}

impl PipelineFind {
    pub fn active() -> Self {
        Self {
            id: None,
            active: Some(true),
        }
    }

    pub fn by_id(id: i64) -> Self {
        Self {
            id: Some(id),
            active: None,
        }
    }

    pub fn matches(&self, pipeline: &Pipeline) -> bool {
        if self.id.is_some_and(|id| id != pipeline.id) {
            return false;
        }
        match self.active {
            Some(active) => active == (pipeline.status == PipelineStatus::Open),
            None => true,
        }
    }
}

impl fmt::Display for PipelineFind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(e) => write!(f, "{}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::engine::{Engine, TargetDatabase};
    use crate::domain::task::{MigrationPayload, TaskPayload};

    fn task(name: &str, status: TaskStatus) -> Task {
        Task {
            id: 0,
            name: name.to_string(),
            target: TargetDatabase::new(Engine::Sqlite, "sqlite::memory:"),
            payload: TaskPayload::Migration(MigrationPayload {
                statement: "SELECT 1".to_string(),
                schema_version: None,
            }),
            status,
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

    fn pipeline(stages: Vec<Vec<TaskStatus>>) -> Pipeline {
        Pipeline {
            id: 7,
            name: "release".to_string(),
            creator_id: 101,
            status: PipelineStatus::Open,
            cancel_requested: false,
            stages: stages
                .into_iter()
                .enumerate()
                .map(|(i, tasks)| Stage {
                    id: i as i64,
                    position: i as u32,
                    name: format!("stage-{}", i),
                    tasks: tasks
                        .into_iter()
                        .enumerate()
                        .map(|(j, s)| task(&format!("t{}", j), s))
                        .collect(),
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_next_stage() {
        let p = pipeline(vec![vec![TaskStatus::Done], vec![TaskStatus::Pending]]);
        assert_eq!(p.next_stage(), Some(1));

        let p = pipeline(vec![vec![TaskStatus::Done], vec![TaskStatus::Done]]);
        assert_eq!(p.next_stage(), None);

        let p = pipeline(vec![vec![TaskStatus::Failed], vec![TaskStatus::Pending]]);
        assert_eq!(p.next_stage(), Some(0));
    }

    #[test]
    fn test_transition_is_monotone() {
        let mut p = pipeline(vec![vec![TaskStatus::Done]]);
        assert!(!p.transition(PipelineStatus::Open));
        assert!(p.transition(PipelineStatus::Done));
        assert!(!p.transition(PipelineStatus::Canceled));
        assert_eq!(p.status, PipelineStatus::Done);
    }

    #[test]
    fn test_invariants() {
        let mut p = pipeline(vec![vec![TaskStatus::Done], vec![TaskStatus::Pending]]);
        p.status = PipelineStatus::Done;
        assert!(p.check_invariants().is_err());

        let mut p = pipeline(vec![vec![TaskStatus::Done]]);
        p.status = PipelineStatus::Canceled;
        assert!(p.check_invariants().is_err());
        p.cancel_requested = true;
        assert!(p.check_invariants().is_ok());

        let p = pipeline(vec![vec![TaskStatus::Running], vec![TaskStatus::Running]]);
        assert!(p.check_invariants().is_err());
    }

    #[test]
    fn test_find_matches() {
        let mut p = pipeline(vec![vec![TaskStatus::Pending]]);
        assert!(PipelineFind::active().matches(&p));
        assert!(PipelineFind::by_id(7).matches(&p));
        assert!(!PipelineFind::by_id(8).matches(&p));

        p.status = PipelineStatus::Canceled;
        assert!(!PipelineFind::active().matches(&p));
        assert!(PipelineFind { id: None, active: Some(false) }.matches(&p));
        assert!(PipelineFind::default().matches(&p));
    }
}
