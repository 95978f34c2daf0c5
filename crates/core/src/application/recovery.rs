// Startup recovery of persisted schedule bindings
use crate::domain::{ScheduleBinding, Workflow};
use crate::port::JobStore;
use std::sync::Arc;
use tracing::{info, warn};

/// A binding that can be put back into service, with its definition
#[derive(Debug, Clone)]
pub struct RecoveredJob {
    pub binding: ScheduleBinding,
    pub workflow: Workflow,
}

/// Reloads the binding table after a restart
///
/// Completed bindings (a one-shot run finished but the process died before
/// retiring it) and bindings whose workflow definition is gone are deleted.
pub struct RecoveryService {
    store: Arc<dyn JobStore>,
}

impl RecoveryService {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn recover(&self) -> crate::error::Result<Vec<RecoveredJob>> {
        let bindings = self.store.list().await?;
        info!(bindings = %bindings.len(), "Starting schedule recovery");

        let mut recovered = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if binding.is_completed() {
                info!(job_id = %binding.id, "Retiring completed binding left from previous run");
                self.store.delete(&binding.id).await?;
                self.store.delete_workflow(&binding.workflow_id).await?;
                continue;
            }

            match self.store.get_workflow(&binding.workflow_id).await? {
                Some(workflow) => match workflow.validate() {
                    Ok(()) => recovered.push(RecoveredJob { binding, workflow }),
                    Err(e) => warn!(
                        job_id = %binding.id,
                        workflow_id = %binding.workflow_id,
                        error = %e,
                        "Stored workflow is invalid, binding skipped"
                    ),
                },
                None => {
                    warn!(
                        job_id = %binding.id,
                        workflow_id = %binding.workflow_id,
                        "Workflow definition missing, deleting dangling binding"
                    );
                    self.store.delete(&binding.id).await?;
                }
            }
        }

        info!(recovered = %recovered.len(), "Schedule recovery complete");
        Ok(recovered)
    }
}
