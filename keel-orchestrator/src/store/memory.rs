//! In-memory pipeline store
//!
//! Volatile; used by tests and by `KEEL_STORE=memory` for local runs.

use async_trait::async_trait;
use chrono::Utc;
use keel_core::domain::pipeline::{Pipeline, PipelineFind};
use keel_core::domain::task::Task;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{PipelineStore, Result, StoreError};

#[derive(Default)]
struct State {
    next_id: i64,
    pipelines: BTreeMap<i64, Pipeline>,
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryPipelineStore {
    state: RwLock<State>,
    fail_writes: AtomicBool,
}

impl MemoryPipelineStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail, to exercise store fault handling
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }
}

#[async_trait]
impl PipelineStore for MemoryPipelineStore {
    async fn create(&self, mut pipeline: Pipeline) -> Result<Pipeline> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        pipeline.id = state.next_id();
        for stage in &mut pipeline.stages {
            stage.id = state.next_id();
            for task in &mut stage.tasks {
                task.id = state.next_id();
            }
        }

        state.pipelines.insert(pipeline.id, pipeline.clone());
        Ok(pipeline)
    }

    async fn get(&self, id: i64) -> Result<Pipeline> {
        self.state
            .read()
            .await
            .pipelines
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn find(&self, find: &PipelineFind) -> Result<Vec<Pipeline>> {
        Ok(self
            .state
            .read()
            .await
            .pipelines
            .values()
            .filter(|p| find.matches(p))
            .cloned()
            .collect())
    }

    async fn save(&self, pipeline: &Pipeline) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        let stored = state
            .pipelines
            .get_mut(&pipeline.id)
            .ok_or(StoreError::NotFound(pipeline.id))?;

        // The cancel flag is only ever raised
        let cancel_requested = stored.cancel_requested || pipeline.cancel_requested;
        *stored = pipeline.clone();
        stored.cancel_requested = cancel_requested;
        stored.updated_at = Utc::now();

        Ok(())
    }

    async fn save_task(&self, pipeline_id: i64, task: &Task) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        let pipeline = state
            .pipelines
            .get_mut(&pipeline_id)
            .ok_or(StoreError::NotFound(pipeline_id))?;

        let stored = pipeline
            .stages
            .iter_mut()
            .flat_map(|s| s.tasks.iter_mut())
            .find(|t| t.id == task.id)
            .ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "task {} does not belong to pipeline {}",
                    task.id, pipeline_id
                ))
            })?;

        *stored = task.clone();
        pipeline.updated_at = Utc::now();

        Ok(())
    }

    async fn request_cancel(&self, id: i64) -> Result<()> {
        self.check_writable()?;
        let mut state = self.state.write().await;

        let pipeline = state
            .pipelines
            .get_mut(&id)
            .ok_or(StoreError::NotFound(id))?;
        pipeline.cancel_requested = true;
        pipeline.updated_at = Utc::now();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::domain::engine::{Engine, TargetDatabase};
    use keel_core::domain::pipeline::PipelineStatus;
    use keel_core::domain::stage::Stage;
    use keel_core::domain::task::{MigrationPayload, TaskPayload, TaskStatus};

    fn pipeline(name: &str) -> Pipeline {
        let now = Utc::now();
        Pipeline {
            id: 0,
            name: name.to_string(),
            creator_id: 7,
            status: PipelineStatus::Open,
            cancel_requested: false,
            stages: vec![Stage {
                id: 0,
                position: 0,
                name: "test".to_string(),
                tasks: vec![Task {
                    id: 0,
                    name: "migrate".to_string(),
                    target: TargetDatabase::new(Engine::Sqlite, "sqlite::memory:"),
                    payload: TaskPayload::Migration(MigrationPayload {
                        statement: "SELECT 1".to_string(),
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
                }],
            }],
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_ids() {
        let store = MemoryPipelineStore::new();

        let first = store.create(pipeline("first")).await.unwrap();
        let second = store.create(pipeline("second")).await.unwrap();

        assert!(first.id > 0);
        assert_ne!(first.id, second.id);
        assert_ne!(first.stages[0].id, 0);
        assert_ne!(first.stages[0].tasks[0].id, second.stages[0].tasks[0].id);
        assert_eq!(store.get(first.id).await.unwrap(), first);
    }

    #[tokio::test]
    async fn test_find_active() {
        let store = MemoryPipelineStore::new();
        let open = store.create(pipeline("open")).await.unwrap();
        let mut done = store.create(pipeline("done")).await.unwrap();
        done.transition(PipelineStatus::Done);
        store.save(&done).await.unwrap();

        let active = store.find(&PipelineFind::active()).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);

        let inactive = store
            .find(&PipelineFind {
                id: None,
                active: Some(false),
            })
            .await
            .unwrap();
        assert_eq!(inactive.len(), 1);
        assert_eq!(inactive[0].id, done.id);

        assert_eq!(store.find(&PipelineFind::default()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_save_task_and_cancel_flag() {
        let store = MemoryPipelineStore::new();
        let created = store.create(pipeline("p")).await.unwrap();

        let mut task = created.stages[0].tasks[0].clone();
        task.mark_running();
        store.save_task(created.id, &task).await.unwrap();

        store.request_cancel(created.id).await.unwrap();
        // A stale aggregate must not clear the flag
        store.save(&created).await.unwrap();

        let stored = store.get(created.id).await.unwrap();
        assert!(stored.cancel_requested);
    }

    #[tokio::test]
    async fn test_missing_pipeline() {
        let store = MemoryPipelineStore::new();
        assert!(matches!(store.get(42).await, Err(StoreError::NotFound(42))));
        assert!(matches!(
            store.request_cancel(42).await,
            Err(StoreError::NotFound(42))
        ));
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let store = MemoryPipelineStore::new();
        store.set_fail_writes(true);
        assert!(matches!(
            store.create(pipeline("p")).await,
            Err(StoreError::Database(_))
        ));
    }
}
