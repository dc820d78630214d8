//! Pipeline Store
//!
//! Persistence of pipeline aggregates. The store is the single source of
//! truth: the orchestrator keeps nothing authoritative in memory, so a
//! restarted process resumes from whatever was last written here.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use keel_core::domain::pipeline::{Pipeline, PipelineFind};
use keel_core::domain::task::Task;
use thiserror::Error;

pub use memory::MemoryPipelineStore;
pub use postgres::PgPipelineStore;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pipeline {0} not found")]
    NotFound(i64),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row could not be mapped back to the domain
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Persistence operations needed by the orchestrator
///
/// Abstracted behind a trait so the engine can run against Postgres in
/// production and an in-memory store in tests.
#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Persists a new pipeline, assigning ids to it and to its stages and tasks
    async fn create(&self, pipeline: Pipeline) -> Result<Pipeline>;

    async fn get(&self, id: i64) -> Result<Pipeline>;

    /// Pipelines matching the filter, ordered by id
    async fn find(&self, find: &PipelineFind) -> Result<Vec<Pipeline>>;

    /// Writes pipeline status and every task state as one unit
    async fn save(&self, pipeline: &Pipeline) -> Result<()>;

    /// Writes the state of one task as it transitions
    async fn save_task(&self, pipeline_id: i64, task: &Task) -> Result<()>;

    /// Sets the cancel flag without touching task state
    async fn request_cancel(&self, id: i64) -> Result<()>;
}
