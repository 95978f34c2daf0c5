// Task execution: process launch, exit-code check, output verification, retries
use crate::application::retry::{RetryDecision, RetryPolicy};
use crate::domain::{AttemptFailure, Task, TaskId, TaskResult, TaskState};
use crate::port::{FileReadinessMonitor, ProcessRunner, Readiness};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, Instant};
use tracing::{info, warn};

/// Every attempt of one task plus its terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRun {
    pub task_id: TaskId,
    pub state: TaskState,
    pub results: Vec<TaskResult>,
}

impl TaskRun {
    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Succeeded
    }
}

/// Runs one task to a terminal state
pub struct TaskExecutor {
    runner: Arc<dyn ProcessRunner>,
    monitor: Arc<dyn FileReadinessMonitor>,
}

impl TaskExecutor {
    pub fn new(runner: Arc<dyn ProcessRunner>, monitor: Arc<dyn FileReadinessMonitor>) -> Self {
        Self { runner, monitor }
    }

    /// Attempt the task until it succeeds or its retry budget is spent
    ///
    /// `output_timeout` bounds the readiness wait of each output file.
    pub async fn execute(&self, task: &Task, output_timeout: Duration) -> TaskRun {
        let policy = RetryPolicy::for_task(task);
        let mut results = Vec::new();
        let mut attempt = 1;

        let state = loop {
            info!(
                task_id = %task.id,
                attempt = %attempt,
                state = %TaskState::Running,
                command = %task.command,
                "Starting task attempt"
            );

            let result = self.attempt(task, attempt, output_timeout).await;
            let succeeded = result.succeeded;
            results.push(result);

            if succeeded {
                info!(task_id = %task.id, attempt = %attempt, "Task succeeded");
                break TaskState::Succeeded;
            }

            match policy.should_retry(&task.id, attempt) {
                RetryDecision::Retry(delay) => {
                    info!(
                        task_id = %task.id,
                        attempt = %attempt,
                        state = %TaskState::Retrying,
                        "Task attempt failed, retrying"
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::Failed => {
                    warn!(task_id = %task.id, attempts = %attempt, "Task failed");
                    break TaskState::Failed;
                }
            }
        };

        TaskRun {
            task_id: task.id.clone(),
            state,
            results,
        }
    }

    async fn attempt(&self, task: &Task, attempt: u32, output_timeout: Duration) -> TaskResult {
        let started = Instant::now();
        let started_wall = SystemTime::now();

        let mut result = TaskResult {
            task_id: task.id.clone(),
            attempt,
            exit_code: None,
            stdout: String::new(),
            stderr: String::new(),
            output_files_verified: false,
            succeeded: false,
            duration_millis: 0,
            failure: None,
        };

        let failure = match self.runner.run(&task.command, &task.args).await {
            Err(e) => {
                warn!(task_id = %task.id, attempt = %attempt, error = %e, "Task launch failed");
                Some(AttemptFailure::Launch {
                    message: e.to_string(),
                })
            }
            Ok(output) => {
                result.exit_code = Some(output.exit_code);
                result.stdout = output.stdout;
                result.stderr = output.stderr;

                if !task.accepts_exit_code(output.exit_code) {
                    warn!(
                        task_id = %task.id,
                        attempt = %attempt,
                        exit_code = %output.exit_code,
                        expected = ?task.expected_exit_codes,
                        "Unexpected exit code"
                    );
                    Some(AttemptFailure::UnexpectedExitCode {
                        exit_code: output.exit_code,
                    })
                } else {
                    let not_before = task.require_fresh_outputs.then_some(started_wall);
                    self.verify_outputs(task, output_timeout, not_before).await
                }
            }
        };

        result.output_files_verified = result.exit_code.is_some() && failure.is_none();
        result.succeeded = failure.is_none();
        result.failure = failure;
        result.duration_millis = started.elapsed().as_millis() as i64;
        result
    }

    /// Wait for each output in order; the first failure wins
    async fn verify_outputs(
        &self,
        task: &Task,
        timeout: Duration,
        not_before: Option<SystemTime>,
    ) -> Option<AttemptFailure> {
        for path in &task.output_files {
            let failure = match self.monitor.await_ready(path, timeout, not_before).await {
                Ok(Readiness::Ready) => continue,
                Ok(Readiness::MissingTimedOut) => AttemptFailure::OutputMissing { path: path.clone() },
                Ok(Readiness::LockedTimedOut) => AttemptFailure::OutputLocked { path: path.clone() },
                Ok(Readiness::StaleTimedOut) => AttemptFailure::OutputStale { path: path.clone() },
                Err(e) => AttemptFailure::FileCheck {
                    path: e.path.clone(),
                    message: e.source.to_string(),
                },
            };
            warn!(task_id = %task.id, failure = %failure, "Output verification failed");
            return Some(failure);
        }
        None
    }
}
