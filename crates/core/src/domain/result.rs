// Execution Result Domain Model

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::domain::task::TaskId;
use crate::domain::workflow::WorkflowId;

/// Why a single attempt failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AttemptFailure {
    /// The process could not be started
    Launch { message: String },
    /// The process exited with a code outside the expected set
    UnexpectedExitCode { exit_code: i32 },
    /// An output file never appeared within the readiness timeout
    OutputMissing { path: PathBuf },
    /// An output file stayed exclusively locked until the timeout
    OutputLocked { path: PathBuf },
    /// An output file existed but predates the attempt
    OutputStale { path: PathBuf },
    /// Probing an output file failed with an I/O error
    FileCheck { path: PathBuf, message: String },
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AttemptFailure::Launch { message } => write!(f, "launch failed: {}", message),
            AttemptFailure::UnexpectedExitCode { exit_code } => {
                write!(f, "unexpected exit code {}", exit_code)
            }
            AttemptFailure::OutputMissing { path } => {
                write!(f, "output {} never appeared", path.display())
            }
            AttemptFailure::OutputLocked { path } => {
                write!(f, "output {} stayed locked", path.display())
            }
            AttemptFailure::OutputStale { path } => {
                write!(f, "output {} was not refreshed", path.display())
            }
            AttemptFailure::FileCheck { path, message } => {
                write!(f, "checking {} failed: {}", path.display(), message)
            }
        }
    }
}

/// Outcome of one attempt of one task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    /// 1-indexed
    pub attempt: u32,
    /// Absent when the process could not be launched
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub output_files_verified: bool,
    pub succeeded: bool,
    pub duration_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<AttemptFailure>,
}

/// Task execution state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Pending,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskState::Pending => write!(f, "pending"),
            TaskState::Running => write!(f, "running"),
            TaskState::Retrying => write!(f, "retrying"),
            TaskState::Succeeded => write!(f, "succeeded"),
            TaskState::Failed => write!(f, "failed"),
        }
    }
}

/// Aggregate outcome of one workflow run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub run_id: String,
    pub workflow_id: WorkflowId,
    /// Epoch ms
    pub started_at: i64,
    /// Epoch ms
    pub finished_at: i64,
    /// One entry per attempt, in execution order
    pub task_results: Vec<TaskResult>,
    pub overall_succeeded: bool,
    pub halted_at_task_id: Option<TaskId>,
    /// Stopped between tasks by a shutdown request
    #[serde(default)]
    pub cancelled: bool,
}

impl WorkflowResult {
    /// All attempts recorded for one task
    pub fn results_for<'a>(&'a self, task_id: &'a str) -> impl Iterator<Item = &'a TaskResult> {
        self.task_results.iter().filter(move |r| r.task_id == task_id)
    }

    /// Number of attempts recorded for one task
    pub fn attempts_for(&self, task_id: &str) -> usize {
        self.results_for(task_id).count()
    }

    pub fn duration_millis(&self) -> i64 {
        self.finished_at - self.started_at
    }
}
