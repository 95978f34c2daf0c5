// Workflow engine - sequential task execution with continue-on-failure policy
use crate::application::task_executor::TaskExecutor;
use crate::domain::{Workflow, WorkflowResult};
use crate::port::{DispatchError, TimeProvider, WorkflowLauncher};
use crate::shutdown::ShutdownToken;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Runs a workflow's tasks strictly in order
pub struct WorkflowEngine {
    executor: TaskExecutor,
    time_provider: Arc<dyn TimeProvider>,
}

impl WorkflowEngine {
    pub fn new(executor: TaskExecutor, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            executor,
            time_provider,
        }
    }

    /// Execute one run of `workflow`
    ///
    /// `cancel` is checked between tasks: once signalled, the run stops
    /// before the next task and is reported as cancelled.
    pub async fn run(
        &self,
        workflow: &Workflow,
        run_id: &str,
        cancel: &ShutdownToken,
    ) -> WorkflowResult {
        let started_at = self.time_provider.now_millis();
        info!(
            workflow_id = %workflow.id,
            run_id = %run_id,
            tasks = %workflow.tasks.len(),
            "Workflow run started"
        );

        let mut task_results = Vec::new();
        let mut halted_at_task_id = None;
        let mut cancelled = false;

        for task in &workflow.tasks {
            if cancel.is_shutdown() {
                warn!(
                    workflow_id = %workflow.id,
                    run_id = %run_id,
                    next_task = %task.id,
                    "Shutdown requested, stopping run before next task"
                );
                halted_at_task_id = Some(task.id.clone());
                cancelled = true;
                break;
            }

            let run = self
                .executor
                .execute(task, workflow.output_timeout_for(task))
                .await;
            let succeeded = run.succeeded();
            task_results.extend(run.results);

            if succeeded {
                continue;
            }
            if task.continue_on_failure {
                warn!(
                    workflow_id = %workflow.id,
                    task_id = %task.id,
                    "Task failed, continuing (continue_on_failure)"
                );
                continue;
            }

            error!(
                workflow_id = %workflow.id,
                run_id = %run_id,
                task_id = %task.id,
                "Task failed, halting workflow"
            );
            halted_at_task_id = Some(task.id.clone());
            break;
        }

        let result = WorkflowResult {
            run_id: run_id.to_string(),
            workflow_id: workflow.id.clone(),
            started_at,
            finished_at: self.time_provider.now_millis(),
            task_results,
            overall_succeeded: halted_at_task_id.is_none(),
            halted_at_task_id,
            cancelled,
        };

        info!(
            workflow_id = %workflow.id,
            run_id = %run_id,
            succeeded = %result.overall_succeeded,
            halted_at = ?result.halted_at_task_id,
            "Workflow run finished"
        );
        result
    }
}

/// Runs workflows on the async runtime of the current process
pub struct InProcessLauncher {
    engine: Arc<WorkflowEngine>,
}

impl InProcessLauncher {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl WorkflowLauncher for InProcessLauncher {
    async fn launch(
        &self,
        workflow: Arc<Workflow>,
        run_id: String,
        cancel: ShutdownToken,
    ) -> Result<WorkflowResult, DispatchError> {
        let engine = Arc::clone(&self.engine);

        // Spawned so a panicking task surfaces as a JoinError instead of
        // unwinding through the caller
        let handle =
            tokio::spawn(async move { engine.run(&workflow, &run_id, &cancel).await });

        handle.await.map_err(|join_err| {
            if join_err.is_panic() {
                DispatchError::Crashed(panic_message(join_err.into_panic()))
            } else {
                DispatchError::Crashed("run was cancelled".to_string())
            }
        })
    }
}

/// Extract the message from a panic payload
pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::readiness::PollingReadinessMonitor;
    use crate::domain::Task;
    use crate::port::process_runner::mocks::{ScriptedProcessRunner, ScriptedResponse};
    use crate::port::readiness::mocks::ScriptedFileProbe;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use crate::shutdown::shutdown_channel;

    fn engine(runner: ScriptedProcessRunner) -> WorkflowEngine {
        let monitor = PollingReadinessMonitor::new(Arc::new(ScriptedFileProbe::new()));
        WorkflowEngine::new(
            TaskExecutor::new(Arc::new(runner), Arc::new(monitor)),
            Arc::new(ManualTimeProvider::new(1_000)),
        )
    }

    fn three_tasks(middle_tolerated: bool) -> Workflow {
        Workflow::new("pipeline")
            .unwrap()
            .with_task(Task::new("t1", "step1"))
            .unwrap()
            .with_task(Task::new("t2", "step2").with_continue_on_failure(middle_tolerated))
            .unwrap()
            .with_task(Task::new("t3", "step3"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_tolerated_failure_continues() {
        let runner = ScriptedProcessRunner::new().script("step2", [ScriptedResponse::exit(1)]);
        let workflow = three_tasks(true);

        let result = engine(runner)
            .run(&workflow, "run-1", &ShutdownToken::never())
            .await;

        assert!(result.overall_succeeded);
        assert_eq!(result.halted_at_task_id, None);
        assert_eq!(result.task_results.len(), 3);
        assert!(!result.results_for("t2").next().unwrap().succeeded);
        assert!(result.results_for("t3").next().unwrap().succeeded);
    }

    #[tokio::test]
    async fn test_non_tolerated_failure_halts() {
        let runner = ScriptedProcessRunner::new().script("step2", [ScriptedResponse::exit(1)]);
        let workflow = three_tasks(false);

        let result = engine(runner)
            .run(&workflow, "run-1", &ShutdownToken::never())
            .await;

        assert!(!result.overall_succeeded);
        assert_eq!(result.halted_at_task_id.as_deref(), Some("t2"));
        assert_eq!(result.attempts_for("t3"), 0);
        assert!(!result.cancelled);
    }

    #[tokio::test]
    async fn test_failing_last_task_sets_halt() {
        let runner = ScriptedProcessRunner::new().script("step3", [ScriptedResponse::exit(2)]);
        let result = engine(runner)
            .run(&three_tasks(false), "run-1", &ShutdownToken::never())
            .await;

        assert!(!result.overall_succeeded);
        assert_eq!(result.halted_at_task_id.as_deref(), Some("t3"));
    }

    #[tokio::test]
    async fn test_definition_is_not_mutated() {
        let workflow = three_tasks(false);
        let before = workflow.clone();
        engine(ScriptedProcessRunner::new())
            .run(&workflow, "run-1", &ShutdownToken::never())
            .await;
        assert_eq!(workflow, before);
    }

    #[tokio::test]
    async fn test_cancelled_between_tasks() {
        let (tx, token) = shutdown_channel();
        let tx = Arc::new(tx);
        let signal = Arc::clone(&tx);
        // The first task requests shutdown while it runs
        let runner = ScriptedProcessRunner::new().script(
            "step1",
            [ScriptedResponse::effect(move || {
                signal.shutdown();
                crate::port::ProcessOutput::exited(0)
            })],
        );

        let result = engine(runner).run(&three_tasks(false), "run-1", &token).await;

        assert!(result.cancelled);
        assert!(!result.overall_succeeded);
        assert_eq!(result.halted_at_task_id.as_deref(), Some("t2"));
        assert_eq!(result.task_results.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_workflow_succeeds() {
        let workflow = Workflow::new("noop").unwrap();
        let result = engine(ScriptedProcessRunner::new())
            .run(&workflow, "run-1", &ShutdownToken::never())
            .await;
        assert!(result.overall_succeeded);
        assert!(result.task_results.is_empty());
    }

    #[tokio::test]
    async fn test_in_process_launcher_reports_panic() {
        let runner = ScriptedProcessRunner::new()
            .script("step1", [ScriptedResponse::Panic("boom".to_string())]);
        let launcher = InProcessLauncher::new(Arc::new(engine(runner)));

        let err = launcher
            .launch(
                Arc::new(three_tasks(false)),
                "run-1".to_string(),
                ShutdownToken::never(),
            )
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Crashed("boom".to_string()));
    }
}
