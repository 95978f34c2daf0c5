// Workflow Launcher Port
// How a pool slot turns a workflow into a WorkflowResult

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::{Workflow, WorkflowResult};
use crate::shutdown::ShutdownToken;

/// The run did not produce a WorkflowResult
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("failed to start run: {0}")]
    Spawn(String),

    #[error("run crashed: {0}")]
    Crashed(String),

    #[error("run returned invalid output: {0}")]
    InvalidOutput(String),
}

/// Executes one workflow run
///
/// Implementations:
/// - InProcessLauncher (core): drives the WorkflowEngine on the runtime
/// - IsolatedProcessLauncher (infra-system): runs the engine in a child process
#[async_trait]
pub trait WorkflowLauncher: Send + Sync {
    /// `cancel` asks the run to stop after its current task
    async fn launch(
        &self,
        workflow: Arc<Workflow>,
        run_id: String,
        cancel: ShutdownToken,
    ) -> Result<WorkflowResult, DispatchError>;
}
