// Retry logic for task attempts
use crate::domain::Task;
use std::time::Duration;
use tracing::{info, warn};

/// Retry decision result
#[derive(Debug, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the task after the given delay
    Retry(Duration),
    /// Do not retry, task has failed permanently
    Failed,
}

/// Fixed-delay retry policy of one task
///
/// A task with `retry_count = N` gets at most `N + 1` attempts, separated by
/// `retry_delay_seconds`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_count: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(retry_count: u32, delay: Duration) -> Self {
        Self { retry_count, delay }
    }

    pub fn for_task(task: &Task) -> Self {
        Self::new(
            task.retry_count,
            Duration::from_secs(task.retry_delay_seconds),
        )
    }

    /// Decide what follows failed attempt number `attempt` (1-indexed)
    pub fn should_retry(&self, task_id: &str, attempt: u32) -> RetryDecision {
        if attempt > self.retry_count {
            warn!(
                task_id = %task_id,
                attempt = %attempt,
                max_attempts = %self.retry_count.saturating_add(1),
                "Max retry attempts reached"
            );
            return RetryDecision::Failed;
        }

        info!(
            task_id = %task_id,
            attempt = %attempt,
            delay_secs = %self.delay.as_secs(),
            "Scheduling retry"
        );
        RetryDecision::Retry(self.delay)
    }
}
