//! Execution engine
//!
//! - `graph`: stage-local task dependency graph
//! - `executor`: runs one task through its driver
//! - `stage`: schedules the tasks of a stage
//! - `orchestrator`: pipeline state machine

pub mod executor;
pub mod graph;
pub mod orchestrator;
pub mod stage;

pub use executor::{RetryPolicy, TaskExecutor};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use stage::StageRunner;
