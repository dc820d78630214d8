//! Pipeline DTOs

use serde::{Deserialize, Serialize};

use crate::domain::engine::TargetDatabase;
use crate::domain::task::TaskPayload;

/// Request to create a new pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCreate {
    /// Value is assigned from the subject of the caller's identity
    pub creator_id: i64,
    pub name: String,
    pub stages: Vec<StageCreate>,
}

/// Stage specification, in execution order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageCreate {
    pub name: String,
    pub tasks: Vec<TaskCreate>,
}

/// Task specification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreate {
    pub name: String,
    pub target: TargetDatabase,
    pub payload: TaskPayload,
    /// Names of sibling tasks in the same stage
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}
