//! Task Executor
//!
//! Runs one task against the driver resolved for its target and turns the
//! result into a terminal outcome. The executor never touches the store; the
//! stage runner persists the transitions it reports.

use keel_core::domain::task::{FailureReason, MAX_TIMEOUT_SECONDS, Task, TaskOutcome};
use keel_driver::{Driver, DriverError, DriverRegistry, OperationId, RegistryError, dispatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, sleep_until, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Backoff between attempts of a retryable failure
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay before attempt `attempt + 1`, doubling from the initial delay
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

/// Result of a single attempt
enum Attempt {
    Done(serde_json::Value),
    Failed {
        reason: FailureReason,
        message: String,
        retryable: bool,
    },
    TimedOut,
    Canceled(String),
}

pub struct TaskExecutor {
    registry: Arc<DriverRegistry>,
    default_timeout: Duration,
    retry: RetryPolicy,
}

impl TaskExecutor {
    pub fn new(registry: Arc<DriverRegistry>, default_timeout: Duration, retry: RetryPolicy) -> Self {
        Self {
            registry,
            default_timeout,
            retry,
        }
    }

    /// Runs a task that the caller already moved to `Running`.
    ///
    /// The deadline covers every attempt, including backoff between them.
    /// Returns the task in a terminal status with its attempt count updated.
    pub async fn run(&self, mut task: Task, mut cancel: watch::Receiver<bool>) -> Task {
        let start = Instant::now();
        let deadline = start
            .checked_add(self.timeout_of(&task))
            .unwrap_or_else(|| start + Duration::from_secs(MAX_TIMEOUT_SECONDS));

        let outcome = self.attempts(&mut task, deadline, &mut cancel).await;

        match &outcome {
            TaskOutcome::Done { .. } => info!("Task '{}' ({}) done", task.name, task.id),
            TaskOutcome::Failed(failure) | TaskOutcome::Canceled(failure) => warn!(
                "Task '{}' ({}) stopped after {} attempt(s): {} ({})",
                task.name, task.id, task.attempts, failure.message, failure.reason
            ),
        }

        task.finish(outcome);
        task
    }

    async fn attempts(
        &self,
        task: &mut Task,
        deadline: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> TaskOutcome {
        let max_attempts = task.max_attempts.max(1);

        loop {
            if *cancel.borrow_and_update() {
                return TaskOutcome::canceled(
                    FailureReason::Canceled,
                    "pipeline canceled before the task started",
                );
            }

            task.attempts += 1;
            debug!(
                "Task '{}' attempt {}/{} against {}",
                task.name, task.attempts, max_attempts, task.target
            );

            let (reason, message) = match self.attempt(task, deadline, cancel).await {
                Attempt::Done(output) => return TaskOutcome::Done { output: Some(output) },
                Attempt::TimedOut => {
                    return TaskOutcome::failed(
                        FailureReason::Timeout,
                        format!("task exceeded its deadline of {:?}", self.timeout_of(task)),
                    );
                }
                Attempt::Canceled(message) => {
                    return TaskOutcome::canceled(FailureReason::Canceled, message);
                }
                Attempt::Failed {
                    reason,
                    message,
                    retryable,
                } => {
                    if !retryable || task.attempts >= max_attempts {
                        return TaskOutcome::failed(reason, message);
                    }
                    (reason, message)
                }
            };

            let delay = self.retry.delay(task.attempts);
            warn!(
                "Task '{}' attempt {}/{} failed: {}. Retrying in {:?}",
                task.name, task.attempts, max_attempts, message, delay
            );

            let wake = (Instant::now() + delay).min(deadline);
            tokio::select! {
                _ = sleep_until(wake) => {
                    if wake >= deadline {
                        return TaskOutcome::failed(reason, message);
                    }
                }
                _ = wait_for_cancel(cancel) => {
                    return TaskOutcome::canceled(
                        FailureReason::Canceled,
                        "pipeline canceled while waiting to retry",
                    );
                }
            }
        }
    }

    async fn attempt(
        &self,
        task: &Task,
        deadline: Instant,
        cancel: &mut watch::Receiver<bool>,
    ) -> Attempt {
        let driver = match timeout_at(deadline, self.registry.resolve(&task.target)).await {
            Err(_) => return Attempt::TimedOut,
            Ok(Err(e)) => {
                return Attempt::Failed {
                    reason: e.failure_reason(),
                    retryable: matches!(e, RegistryError::Connection { .. }),
                    message: e.to_string(),
                };
            }
            Ok(Ok(driver)) => driver,
        };

        // Unsupported capabilities are rejected by the driver itself
        let operation: OperationId = Uuid::new_v4();
        let work = dispatch(driver.as_ref(), operation, &task.payload);
        tokio::pin!(work);

        let mut cancel_requested = false;
        let mut listening = true;

        loop {
            tokio::select! {
                biased;

                result = &mut work => {
                    return match result {
                        Ok(output) => Attempt::Done(output),
                        Err(e) => {
                            // A broken pool is rebuilt on the next attempt
                            if matches!(e, DriverError::Connection(_))
                                && self.registry.evict(&task.target).await
                            {
                                warn!("Dropped cached driver for {} after a connection error", task.target);
                            }
                            Attempt::Failed {
                                reason: e.failure_reason(),
                                retryable: e.is_retryable(),
                                message: e.to_string(),
                            }
                        }
                    };
                }
                _ = sleep_until(deadline) => {
                    if cancel_requested {
                        return Attempt::Canceled(
                            "deadline elapsed after cancellation was requested".to_string(),
                        );
                    }
                    // Stop the statement server-side so a rerun cannot overlap it
                    self.request_cancel(driver.as_ref(), operation, task).await;
                    return Attempt::TimedOut;
                }
                changed = cancel.changed(), if listening && !cancel_requested => {
                    if changed.is_err() {
                        listening = false;
                        continue;
                    }
                    if !*cancel.borrow_and_update() {
                        continue;
                    }
                    cancel_requested = true;
                    if self.request_cancel(driver.as_ref(), operation, task).await {
                        return Attempt::Canceled("canceled by the driver".to_string());
                    }
                }
            }
        }
    }

    /// Asks the driver to interrupt the operation; true if it did
    async fn request_cancel(&self, driver: &dyn Driver, operation: OperationId, task: &Task) -> bool {
        match driver.cancel(operation).await {
            Ok(true) => {
                info!("Driver interrupted task '{}'", task.name);
                true
            }
            Ok(false) => {
                info!(
                    "Driver cannot interrupt task '{}', waiting for it to finish",
                    task.name
                );
                false
            }
            Err(e) => {
                warn!("Failed to cancel task '{}': {}", task.name, e);
                false
            }
        }
    }

    fn timeout_of(&self, task: &Task) -> Duration {
        task.timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or(self.default_timeout)
            .min(Duration::from_secs(MAX_TIMEOUT_SECONDS))
    }
}

/// Resolves once cancellation is signaled; never if the sender is gone
async fn wait_for_cancel(cancel: &mut watch::Receiver<bool>) {
    if cancel.wait_for(|canceled| *canceled).await.is_err() {
        std::future::pending::<()>().await;
    }
}
