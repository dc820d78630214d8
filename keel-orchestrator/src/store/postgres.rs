//! Postgres pipeline store
//!
//! Pipelines, stages and tasks live in three tables. Aggregate writes happen
//! in one transaction so a pipeline is never persisted half-updated.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keel_core::domain::engine::{Engine, TargetDatabase};
use keel_core::domain::pipeline::{Pipeline, PipelineFind, PipelineStatus};
use keel_core::domain::stage::Stage;
use keel_core::domain::task::{FailureReason, Task, TaskFailure, TaskPayload, TaskStatus};
use sqlx::{PgExecutor, PgPool};
use std::collections::HashMap;

use super::{PipelineStore, Result, StoreError};

pub struct PgPipelineStore {
    pool: PgPool,
}

impl PgPipelineStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Loads stages and tasks of the given pipelines and attaches them
    async fn assemble(&self, rows: Vec<PipelineRow>) -> Result<Vec<Pipeline>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();

        let stage_rows = sqlx::query_as::<_, StageRow>(
            r#"
            SELECT id, pipeline_id, position, name
            FROM stages
            WHERE pipeline_id = ANY($1)
            ORDER BY pipeline_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let task_rows = sqlx::query_as::<_, TaskRow>(
            r#"
            SELECT id, stage_id, name, engine, dsn, payload, status, depends_on,
                   max_attempts, timeout_seconds, attempts, failure_reason,
                   failure_message, output, started_at, completed_at
            FROM tasks
            WHERE pipeline_id = ANY($1)
            ORDER BY stage_id, position
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut tasks: HashMap<i64, Vec<Task>> = HashMap::new();
        for row in task_rows {
            let stage_id = row.stage_id;
            tasks.entry(stage_id).or_default().push(Task::try_from(row)?);
        }

        let mut stages: HashMap<i64, Vec<Stage>> = HashMap::new();
        for row in stage_rows {
            stages.entry(row.pipeline_id).or_default().push(Stage {
                id: row.id,
                position: row.position as u32,
                name: row.name,
                tasks: tasks.remove(&row.id).unwrap_or_default(),
            });
        }

        rows.into_iter()
            .map(|row| {
                let id = row.id;
                let mut pipeline = Pipeline::try_from(row)?;
                pipeline.stages = stages.remove(&id).unwrap_or_default();
                Ok(pipeline)
            })
            .collect()
    }
}

#[async_trait]
impl PipelineStore for PgPipelineStore {
    async fn create(&self, mut pipeline: Pipeline) -> Result<Pipeline> {
        let mut tx = self.pool.begin().await?;

        let (id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO pipelines (name, creator_id, status, cancel_requested, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(&pipeline.name)
        .bind(pipeline.creator_id)
        .bind(pipeline.status.as_str())
        .bind(pipeline.cancel_requested)
        .bind(pipeline.created_at)
        .bind(pipeline.updated_at)
        .fetch_one(&mut *tx)
        .await?;
        pipeline.id = id;

        for stage in &mut pipeline.stages {
            let (stage_id,): (i64,) = sqlx::query_as(
                "INSERT INTO stages (pipeline_id, position, name) VALUES ($1, $2, $3) RETURNING id",
            )
            .bind(id)
            .bind(stage.position as i32)
            .bind(&stage.name)
            .fetch_one(&mut *tx)
            .await?;
            stage.id = stage_id;

            for (position, task) in stage.tasks.iter_mut().enumerate() {
                let payload = serde_json::to_value(&task.payload)
                    .map_err(|e| StoreError::Corrupt(e.to_string()))?;
                let max_attempts = i32::try_from(task.max_attempts).map_err(|_| {
                    StoreError::Corrupt(format!("task '{}' max_attempts out of range", task.name))
                })?;
                let timeout_seconds = task
                    .timeout_seconds
                    .map(i64::try_from)
                    .transpose()
                    .map_err(|_| {
                        StoreError::Corrupt(format!("task '{}' timeout out of range", task.name))
                    })?;

                let (task_id,): (i64,) = sqlx::query_as(
                    r#"
                    INSERT INTO tasks (
                        pipeline_id, stage_id, position, name, engine, dsn, payload,
                        status, depends_on, max_attempts, timeout_seconds, attempts
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                    RETURNING id
                    "#,
                )
                .bind(id)
                .bind(stage_id)
                .bind(position as i32)
                .bind(&task.name)
                .bind(task.target.engine.as_str())
                .bind(&task.target.connection.dsn)
                .bind(payload)
                .bind(task.status.as_str())
                .bind(&task.depends_on)
                .bind(max_attempts)
                .bind(timeout_seconds)
                .bind(task.attempts as i32)
                .fetch_one(&mut *tx)
                .await?;
                task.id = task_id;
            }
        }

        tx.commit().await?;

        Ok(pipeline)
    }

    async fn get(&self, id: i64) -> Result<Pipeline> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, name, creator_id, status, cancel_requested, created_at, updated_at
            FROM pipelines
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;

        self.assemble(vec![row])
            .await?
            .pop()
            .ok_or(StoreError::NotFound(id))
    }

    async fn find(&self, find: &PipelineFind) -> Result<Vec<Pipeline>> {
        let rows = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, name, creator_id, status, cancel_requested, created_at, updated_at
            FROM pipelines
            WHERE ($1::BIGINT IS NULL OR id = $1)
              AND ($2::BOOLEAN IS NULL OR (status = 'OPEN') = $2)
            ORDER BY id
            "#,
        )
        .bind(find.id)
        .bind(find.active)
        .fetch_all(&self.pool)
        .await?;

        self.assemble(rows).await
    }

    async fn save(&self, pipeline: &Pipeline) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE pipelines
            SET status = $1, cancel_requested = cancel_requested OR $2, updated_at = $3
            WHERE id = $4
            "#,
        )
        .bind(pipeline.status.as_str())
        .bind(pipeline.cancel_requested)
        .bind(Utc::now())
        .bind(pipeline.id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(pipeline.id));
        }

        for task in pipeline.tasks() {
            update_task(&mut *tx, pipeline.id, task).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn save_task(&self, pipeline_id: i64, task: &Task) -> Result<()> {
        update_task(&self.pool, pipeline_id, task).await
    }

    async fn request_cancel(&self, id: i64) -> Result<()> {
        let result = sqlx::query(
            "UPDATE pipelines SET cancel_requested = TRUE, updated_at = $1 WHERE id = $2",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

async fn update_task<'e, E: PgExecutor<'e>>(executor: E, pipeline_id: i64, task: &Task) -> Result<()> {
    let output = task.output.clone();
    let (reason, message) = match &task.failure {
        Some(failure) => (Some(failure.reason.as_str()), Some(failure.message.as_str())),
        None => (None, None),
    };

    let result = sqlx::query(
        r#"
        UPDATE tasks
        SET status = $1, attempts = $2, failure_reason = $3, failure_message = $4,
            output = $5, started_at = $6, completed_at = $7
        WHERE id = $8 AND pipeline_id = $9
        "#,
    )
    .bind(task.status.as_str())
    .bind(task.attempts as i32)
    .bind(reason)
    .bind(message)
    .bind(output)
    .bind(task.started_at)
    .bind(task.completed_at)
    .bind(task.id)
    .bind(pipeline_id)
    .execute(executor)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::Corrupt(format!(
            "task {} does not belong to pipeline {}",
            task.id, pipeline_id
        )));
    }
    Ok(())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: i64,
    name: String,
    creator_id: i64,
    status: String,
    cancel_requested: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = StoreError;

    fn try_from(row: PipelineRow) -> Result<Self> {
        Ok(Pipeline {
            id: row.id,
            name: row.name,
            creator_id: row.creator_id,
            status: row
                .status
                .parse::<PipelineStatus>()
                .map_err(StoreError::Corrupt)?,
            cancel_requested: row.cancel_requested,
            stages: Vec::new(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct StageRow {
    id: i64,
    pipeline_id: i64,
    position: i32,
    name: String,
}

#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    stage_id: i64,
    name: String,
    engine: String,
    dsn: String,
    payload: serde_json::Value,
    status: String,
    depends_on: Vec<String>,
    max_attempts: i32,
    timeout_seconds: Option<i64>,
    attempts: i32,
    failure_reason: Option<String>,
    failure_message: Option<String>,
    output: Option<serde_json::Value>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for Task {
    type Error = StoreError;

    fn try_from(row: TaskRow) -> Result<Self> {
        let engine = row.engine.parse::<Engine>().map_err(StoreError::Corrupt)?;
        let payload: TaskPayload = serde_json::from_value(row.payload)
            .map_err(|e| StoreError::Corrupt(format!("task {} payload: {}", row.id, e)))?;

        let failure = match row.failure_reason {
            Some(reason) => Some(TaskFailure::new(
                reason.parse::<FailureReason>().map_err(StoreError::Corrupt)?,
                row.failure_message.unwrap_or_default(),
            )),
            None => None,
        };

        let timeout_seconds = row
            .timeout_seconds
            .map(u64::try_from)
            .transpose()
            .map_err(|_| StoreError::Corrupt(format!("task {} has a negative timeout", row.id)))?;

        Ok(Task {
            id: row.id,
            name: row.name,
            target: TargetDatabase::new(engine, row.dsn),
            payload,
            status: row.status.parse::<TaskStatus>().map_err(StoreError::Corrupt)?,
            depends_on: row.depends_on,
            max_attempts: row.max_attempts.max(1) as u32,
            timeout_seconds,
            attempts: row.attempts.max(0) as u32,
            failure,
            output: row.output,
            started_at: row.started_at,
            completed_at: row.completed_at,
        })
    }
}
