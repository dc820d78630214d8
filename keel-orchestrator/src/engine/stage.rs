//! Stage Runner
//!
//! Schedules the tasks of one stage by their dependency edges with bounded
//! fan-out. The runner has no retry logic of its own; retries belong to the
//! executor.

use keel_core::domain::stage::{Stage, StageStatus};
use keel_core::domain::task::{FailureReason, TaskOutcome, TaskStatus};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Semaphore, watch};
use tokio::task::{Id, JoinSet};
use tracing::{error, info, warn};

use crate::engine::executor::TaskExecutor;
use crate::engine::graph::DependencyGraph;
use crate::store::{self, PipelineStore};

pub struct StageRunner {
    executor: Arc<TaskExecutor>,
    store: Arc<dyn PipelineStore>,
    max_parallel_tasks: usize,
}

impl StageRunner {
    pub fn new(
        executor: Arc<TaskExecutor>,
        store: Arc<dyn PipelineStore>,
        max_parallel_tasks: usize,
    ) -> Self {
        Self {
            executor,
            store,
            max_parallel_tasks: max_parallel_tasks.max(1),
        }
    }

    /// Runs the stage until every task is terminal.
    ///
    /// Every task transition is written to the store as it happens. On a
    /// cancel signal no new task starts and unstarted tasks are canceled;
    /// tasks already running are left to their executor. Store errors abort
    /// the stage.
    pub async fn run(
        &self,
        pipeline_id: i64,
        stage: &mut Stage,
        mut cancel: watch::Receiver<bool>,
    ) -> store::Result<StageStatus> {
        let graph = match DependencyGraph::build(&stage.tasks) {
            Ok(graph) => graph,
            Err(e) => {
                error!("Stage '{}' has an invalid task graph: {}", stage.name, e);
                for task in stage.tasks.iter_mut().filter(|t| !t.is_terminal()) {
                    task.finish(TaskOutcome::failed(
                        FailureReason::ExecutionFailure,
                        format!("invalid task graph: {}", e),
                    ));
                    self.store.save_task(pipeline_id, task).await?;
                }
                return Ok(stage.status());
            }
        };
        let order = graph
            .topological_sort()
            .unwrap_or_else(|_| (0..stage.tasks.len()).collect());

        info!(
            "Running stage '{}' ({} tasks) of pipeline {}",
            stage.name,
            stage.tasks.len(),
            pipeline_id
        );

        let semaphore = Arc::new(Semaphore::new(self.max_parallel_tasks));
        let mut running = JoinSet::new();
        let mut in_flight: HashMap<Id, usize> = HashMap::new();
        let mut listening = true;

        loop {
            let canceled = *cancel.borrow_and_update();

            // Topological order lets poisoning cascade in a single pass
            for &i in &order {
                if stage.tasks[i].is_terminal() || in_flight.values().any(|&j| j == i) {
                    continue;
                }

                let failed_dependency = graph
                    .dependencies(i)
                    .iter()
                    .map(|&d| &stage.tasks[d])
                    .find(|d| matches!(d.status, TaskStatus::Failed | TaskStatus::Canceled))
                    .map(|d| format!("dependency '{}' ended {}", d.name, d.status));

                let outcome = if let Some(message) = failed_dependency {
                    Some(TaskOutcome::canceled(FailureReason::DependencyFailed, message))
                } else if canceled {
                    Some(TaskOutcome::canceled(
                        FailureReason::Canceled,
                        "pipeline canceled before the task started",
                    ))
                } else {
                    None
                };

                if let Some(outcome) = outcome {
                    let task = &mut stage.tasks[i];
                    task.finish(outcome);
                    info!("Task '{}' canceled without running", task.name);
                    self.store.save_task(pipeline_id, task).await?;
                    continue;
                }

                let ready = graph
                    .dependencies(i)
                    .iter()
                    .all(|&d| stage.tasks[d].status == TaskStatus::Done);
                if !ready {
                    continue;
                }

                let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                    continue;
                };

                let task = &mut stage.tasks[i];
                if task.status == TaskStatus::Running {
                    warn!(
                        "Task '{}' ({}) was left running by a previous process, re-running it",
                        task.name, task.id
                    );
                }
                task.mark_running();
                self.store.save_task(pipeline_id, task).await?;

                let executor = Arc::clone(&self.executor);
                let task = task.clone();
                let cancel = cancel.clone();
                let handle = running.spawn(async move {
                    let _permit = permit;
                    executor.run(task, cancel).await
                });
                in_flight.insert(handle.id(), i);
            }

            if running.is_empty() {
                break;
            }

            tokio::select! {
                joined = running.join_next_with_id() => {
                    match joined {
                        Some(Ok((id, task))) => {
                            if let Some(i) = in_flight.remove(&id) {
                                stage.tasks[i] = task;
                                self.store.save_task(pipeline_id, &stage.tasks[i]).await?;
                            }
                        }
                        Some(Err(e)) => {
                            if let Some(i) = in_flight.remove(&e.id()) {
                                let task = &mut stage.tasks[i];
                                error!("Task '{}' ({}) aborted: {}", task.name, task.id, e);
                                task.finish(TaskOutcome::failed(
                                    FailureReason::ExecutionFailure,
                                    format!("task aborted: {}", e),
                                ));
                                self.store.save_task(pipeline_id, task).await?;
                            }
                        }
                        None => {}
                    }
                }
                changed = cancel.changed(), if listening => {
                    if changed.is_err() {
                        listening = false;
                    }
                }
            }
        }

        let status = stage.status();
        info!(
            "Stage '{}' of pipeline {} finished: {}",
            stage.name, pipeline_id, status
        );
        Ok(status)
    }
}
