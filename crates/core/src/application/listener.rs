// Tracing-backed execution listener
use crate::port::{ExecutionListener, SchedulerEvent};
use tracing::{error, info, warn};

/// Logs every scheduler event as a structured tracing record
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingListener;

impl ExecutionListener for TracingListener {
    fn on_event(&self, event: &SchedulerEvent) {
        match event {
            SchedulerEvent::JobDispatched {
                id,
                workflow_id,
                run_id,
                pool,
            } => info!(
                job_id = %id,
                workflow_id = %workflow_id,
                run_id = %run_id,
                pool = %pool,
                "Job dispatched"
            ),
            SchedulerEvent::JobSkippedBackpressure { id, pool } => {
                warn!(job_id = %id, pool = %pool, "Pool saturated, dispatch deferred")
            }
            SchedulerEvent::JobSkippedMaxInstances { id, running } => warn!(
                job_id = %id,
                running = %running,
                "Maximum concurrent runs reached, fire skipped"
            ),
            SchedulerEvent::JobMissed { id, scheduled_for } => warn!(
                job_id = %id,
                scheduled_for = %scheduled_for,
                "Fire missed its grace period"
            ),
            SchedulerEvent::JobRetired { id } => info!(job_id = %id, "One-shot job retired"),
            SchedulerEvent::WorkflowCompleted { id, result } => {
                if result.overall_succeeded {
                    info!(
                        job_id = %id,
                        workflow_id = %result.workflow_id,
                        run_id = %result.run_id,
                        duration_ms = %result.duration_millis(),
                        attempts = %result.task_results.len(),
                        "Workflow completed"
                    );
                } else {
                    error!(
                        job_id = %id,
                        workflow_id = %result.workflow_id,
                        run_id = %result.run_id,
                        halted_at = ?result.halted_at_task_id,
                        cancelled = %result.cancelled,
                        "Workflow failed"
                    );
                }
            }
            SchedulerEvent::WorkflowError { id, error } => {
                error!(job_id = %id, error = %error, "Workflow run crashed")
            }
        }
    }
}
