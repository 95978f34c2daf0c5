// Isolated process launcher
// Runs a workflow in a child process of the daemon binary:
//   <program> <base_args..> --run-id <id>
// stdin: workflow JSON, stdout: WorkflowResult JSON, stderr: child logs
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use batchflow_core::domain::{Workflow, WorkflowResult};
use batchflow_core::port::workflow_launcher::{DispatchError, WorkflowLauncher};
use batchflow_core::shutdown::ShutdownToken;

/// Subcommand the daemon binary exposes for isolated runs
pub const RUN_WORKFLOW_SUBCOMMAND: &str = "run-workflow";

/// Process-pool launcher
///
/// Cancellation sends SIGTERM (Unix) so the child can finish its current
/// task and still report a result. Elsewhere the child is killed.
#[derive(Debug, Clone)]
pub struct IsolatedProcessLauncher {
    program: PathBuf,
    base_args: Vec<String>,
}

impl IsolatedProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, base_args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            base_args,
        }
    }

    /// Re-execute the running binary's `run-workflow` subcommand
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(
            std::env::current_exe()?,
            vec![RUN_WORKFLOW_SUBCOMMAND.to_string()],
        ))
    }

    fn spawn(&self, run_id: &str) -> Result<Child, DispatchError> {
        Command::new(&self.program)
            .args(&self.base_args)
            .arg("--run-id")
            .arg(run_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| DispatchError::Spawn(format!("{}: {}", self.program.display(), e)))
    }
}

/// Ask the child to stop after its current task
fn request_stop(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        if let Some(pid) = child.id() {
            if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
                warn!(pid = pid, error = %e, "Failed to signal child");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = child.start_kill() {
            warn!(error = %e, "Failed to kill child");
        }
    }
}

/// Kill and reap a child whose run cannot go on
async fn discard(child: &mut Child, run_id: &str) {
    if let Err(e) = child.start_kill() {
        warn!(run_id = %run_id, error = %e, "Failed to kill child");
    }
    if let Err(e) = child.wait().await {
        warn!(run_id = %run_id, error = %e, "Failed to reap child");
    }
}

fn parse_result(status: ExitStatus, stdout: &[u8]) -> Result<WorkflowResult, DispatchError> {
    let text = String::from_utf8_lossy(stdout);
    if text.trim().is_empty() {
        return Err(DispatchError::Crashed(format!(
            "child exited with {} and produced no result",
            status
        )));
    }

    serde_json::from_str(text.trim()).map_err(|e| DispatchError::InvalidOutput(e.to_string()))
}

#[async_trait]
impl WorkflowLauncher for IsolatedProcessLauncher {
    async fn launch(
        &self,
        workflow: Arc<Workflow>,
        run_id: String,
        mut cancel: ShutdownToken,
    ) -> Result<WorkflowResult, DispatchError> {
        let payload = serde_json::to_vec(workflow.as_ref())
            .map_err(|e| DispatchError::Spawn(format!("cannot encode workflow: {}", e)))?;

        let mut child = self.spawn(&run_id)?;
        info!(
            workflow_id = %workflow.id,
            run_id = %run_id,
            pid = ?child.id(),
            "Isolated run started"
        );

        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&payload).await {
                Ok(()) => {}
                // Child exited before reading; its status tells the story
                Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                    debug!(run_id = %run_id, "Child closed stdin early");
                }
                Err(e) => {
                    discard(&mut child, &run_id).await;
                    return Err(DispatchError::Spawn(e.to_string()));
                }
            }
        }

        let Some(mut stdout) = child.stdout.take() else {
            discard(&mut child, &run_id).await;
            return Err(DispatchError::Spawn("child stdout not captured".to_string()));
        };
        let reader = tokio::spawn(async move {
            let mut buf = Vec::new();
            stdout.read_to_end(&mut buf).await.map(|_| buf)
        });

        let mut signalled = false;
        let status = loop {
            tokio::select! {
                status = child.wait() => {
                    break status.map_err(|e| DispatchError::Crashed(e.to_string()))?;
                }
                _ = cancel.wait(), if !signalled => {
                    info!(run_id = %run_id, "Cancelling isolated run");
                    signalled = true;
                    request_stop(&mut child);
                }
            }
        };

        let stdout = reader
            .await
            .map_err(|e| DispatchError::Crashed(e.to_string()))?
            .map_err(|e| DispatchError::Crashed(e.to_string()))?;

        debug!(run_id = %run_id, status = %status, bytes = stdout.len(), "Isolated run exited");
        parse_result(status, &stdout)
    }
}
