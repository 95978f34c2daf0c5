// Task Domain Model

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

use crate::domain::error::{DomainError, Result};

/// Task identifier (unique within its workflow)
pub type TaskId = String;

fn default_expected_exit_codes() -> BTreeSet<i32> {
    BTreeSet::from([0])
}

/// One external-process step of a workflow
///
/// Deserializes from the definition surface
/// `{id, command, args[], expected_exit_codes[], output_files[], retry_count,
/// retry_delay_seconds, continue_on_failure}` with the documented defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_expected_exit_codes")]
    pub expected_exit_codes: BTreeSet<i32>,
    #[serde(default)]
    pub output_files: Vec<PathBuf>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_delay_seconds: u64,
    #[serde(default)]
    pub continue_on_failure: bool,

    /// Overrides the workflow-level readiness timeout for this task's outputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_timeout_seconds: Option<u64>,

    /// Outputs must have been modified after the attempt that produced them started
    #[serde(default)]
    pub require_fresh_outputs: bool,
}

impl Task {
    /// Create a task with default policy (exit code 0, no retries, no outputs)
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: Vec::new(),
            expected_exit_codes: default_expected_exit_codes(),
            output_files: Vec::new(),
            retry_count: 0,
            retry_delay_seconds: 0,
            continue_on_failure: false,
            output_timeout_seconds: None,
            require_fresh_outputs: false,
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_expected_exit_codes(mut self, codes: impl IntoIterator<Item = i32>) -> Self {
        self.expected_exit_codes = codes.into_iter().collect();
        self
    }

    pub fn with_output_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_files.push(path.into());
        self
    }

    pub fn with_retries(mut self, retry_count: u32, retry_delay_seconds: u64) -> Self {
        self.retry_count = retry_count;
        self.retry_delay_seconds = retry_delay_seconds;
        self
    }

    pub fn with_continue_on_failure(mut self, continue_on_failure: bool) -> Self {
        self.continue_on_failure = continue_on_failure;
        self
    }

    pub fn with_output_timeout(mut self, seconds: u64) -> Self {
        self.output_timeout_seconds = Some(seconds);
        self
    }

    pub fn with_fresh_outputs(mut self, require_fresh_outputs: bool) -> Self {
        self.require_fresh_outputs = require_fresh_outputs;
        self
    }

    /// Whether an exit code counts as success for this task
    pub fn accepts_exit_code(&self, exit_code: i32) -> bool {
        self.expected_exit_codes.contains(&exit_code)
    }

    /// Upper bound on attempts (`retry_count + 1`)
    pub fn max_attempts(&self) -> u32 {
        self.retry_count.saturating_add(1)
    }

    /// Validate the task definition
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "task id cannot be empty".to_string(),
            ));
        }
        if self.command.trim().is_empty() {
            return Err(DomainError::ValidationError(format!(
                "task '{}' has an empty command",
                self.id
            )));
        }
        if self.expected_exit_codes.is_empty() {
            return Err(DomainError::ValidationError(format!(
                "task '{}' must accept at least one exit code",
                self.id
            )));
        }
        if let Some(path) = self.output_files.iter().find(|p| p.as_os_str().is_empty()) {
            return Err(DomainError::ValidationError(format!(
                "task '{}' has an empty output path {:?}",
                self.id, path
            )));
        }
        Ok(())
    }
}
