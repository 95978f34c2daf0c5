// Workflow Domain Model

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

use crate::domain::error::{DomainError, Result};
use crate::domain::task::Task;

/// Workflow identifier
pub type WorkflowId = String;

/// Default readiness wait for output files (seconds)
pub const DEFAULT_OUTPUT_TIMEOUT_SECS: u64 = 60;

fn default_output_timeout() -> u64 {
    DEFAULT_OUTPUT_TIMEOUT_SECS
}

/// Named, ordered sequence of tasks run strictly one after another
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    #[serde(default)]
    pub tasks: Vec<Task>,
    /// Workflow-level default for output readiness waits
    #[serde(default = "default_output_timeout")]
    pub output_timeout_seconds: u64,
}

impl Workflow {
    /// Create an empty workflow
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "workflow id cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            id,
            tasks: Vec::new(),
            output_timeout_seconds: DEFAULT_OUTPUT_TIMEOUT_SECS,
        })
    }

    /// Append a validated task; task ids must stay unique
    pub fn add_task(&mut self, task: Task) -> Result<()> {
        task.validate()?;
        if self.tasks.iter().any(|t| t.id == task.id) {
            return Err(DomainError::DuplicateTaskId {
                workflow_id: self.id.clone(),
                task_id: task.id,
            });
        }
        self.tasks.push(task);
        Ok(())
    }

    /// Chainable variant of [`Workflow::add_task`]
    pub fn with_task(mut self, task: Task) -> Result<Self> {
        self.add_task(task)?;
        Ok(self)
    }

    pub fn with_output_timeout(mut self, seconds: u64) -> Self {
        self.output_timeout_seconds = seconds;
        self
    }

    pub fn task(&self, task_id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == task_id)
    }

    /// Readiness timeout for a task's outputs (task override, else workflow default)
    pub fn output_timeout_for(&self, task: &Task) -> Duration {
        Duration::from_secs(
            task.output_timeout_seconds
                .unwrap_or(self.output_timeout_seconds),
        )
    }

    /// Re-check invariants of a definition that did not go through `add_task`
    /// (e.g. deserialized from storage or a definitions file)
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "workflow id cannot be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for task in &self.tasks {
            task.validate()?;
            if !seen.insert(task.id.as_str()) {
                return Err(DomainError::DuplicateTaskId {
                    workflow_id: self.id.clone(),
                    task_id: task.id.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_task_rejects_duplicate_id() {
        let mut workflow = Workflow::new("nightly").unwrap();
        workflow.add_task(Task::new("dump", "pg_dump")).unwrap();

        let err = workflow.add_task(Task::new("dump", "gzip")).unwrap_err();
        assert_eq!(
            err,
            DomainError::DuplicateTaskId {
                workflow_id: "nightly".to_string(),
                task_id: "dump".to_string(),
            }
        );
        assert_eq!(workflow.tasks.len(), 1);
    }

    #[test]
    fn test_output_timeout_override() {
        let workflow = Workflow::new("wf")
            .unwrap()
            .with_output_timeout(120)
            .with_task(Task::new("a", "true"))
            .unwrap()
            .with_task(Task::new("b", "true").with_output_timeout(5))
            .unwrap();

        let a = workflow.task("a").unwrap();
        let b = workflow.task("b").unwrap();
        assert_eq!(workflow.output_timeout_for(a), Duration::from_secs(120));
        assert_eq!(workflow.output_timeout_for(b), Duration::from_secs(5));
    }

    #[test]
    fn test_validate_detects_duplicates_after_deserialization() {
        let workflow: Workflow = serde_json::from_value(serde_json::json!({
            "id": "wf",
            "tasks": [
                {"id": "x", "command": "true"},
                {"id": "x", "command": "false"}
            ]
        }))
        .unwrap();

        assert_eq!(workflow.output_timeout_seconds, DEFAULT_OUTPUT_TIMEOUT_SECS);
        assert!(matches!(
            workflow.validate(),
            Err(DomainError::DuplicateTaskId { .. })
        ));
    }

    #[test]
    fn test_empty_id_rejected() {
        assert!(Workflow::new("").is_err());
    }
}
