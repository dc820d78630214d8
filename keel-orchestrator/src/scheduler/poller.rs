//! Advance poller
//!
//! Periodically lists open pipelines and advances each in its own task.
//! A pipeline already advancing in this process is skipped until the next
//! tick.

use anyhow::{Context, Result};
use keel_core::domain::pipeline::PipelineFind;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{self, Duration, MissedTickBehavior};
use tracing::{debug, error, info};

use crate::engine::Orchestrator;

pub struct AdvancePoller {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    semaphore: Arc<Semaphore>,
}

impl AdvancePoller {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        interval: Duration,
        max_parallel_pipelines: usize,
    ) -> Self {
        Self {
            orchestrator,
            interval,
            semaphore: Arc::new(Semaphore::new(max_parallel_pipelines.max(1))),
        }
    }

    /// Runs the polling loop forever
    pub async fn run(&self) {
        info!("Starting advance poller (interval: {:?})", self.interval);

        let mut interval = time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            interval.tick().await;

            match self.poll_once().await {
                Ok(started) if started > 0 => {
                    info!("Advancing {} pipeline(s) this cycle", started)
                }
                Ok(_) => {}
                Err(e) => error!("Error during advance cycle: {:#}", e),
            }
        }
    }

    /// Starts an advance for every open pipeline that has a free slot.
    ///
    /// Returns the number of pipelines started; they run in the background.
    pub async fn poll_once(&self) -> Result<usize> {
        let pipelines = self
            .orchestrator
            .find(&PipelineFind::active())
            .await
            .context("Failed to list open pipelines")?;

        debug!("Found {} open pipeline(s)", pipelines.len());

        let mut started = 0;
        for pipeline in pipelines {
            if self.orchestrator.is_in_flight(pipeline.id) {
                debug!("Pipeline {} is already advancing", pipeline.id);
                continue;
            }

            let Ok(permit) = self.semaphore.clone().try_acquire_owned() else {
                debug!(
                    "Max parallel pipelines reached, deferring pipeline {}",
                    pipeline.id
                );
                break;
            };

            self.spawn_advance(pipeline.id, permit);
            started += 1;
        }

        Ok(started)
    }

    fn spawn_advance(&self, id: i64, permit: OwnedSemaphorePermit) {
        let orchestrator = Arc::clone(&self.orchestrator);

        tokio::spawn(async move {
            let _permit = permit;
            match orchestrator.advance(id).await {
                Ok(pipeline) => debug!("Pipeline {} advanced, now {}", id, pipeline.status),
                Err(e) => error!("Failed to advance pipeline {}: {}", id, e),
            }
        });
    }
}
