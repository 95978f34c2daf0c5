// Workflow catalog - definitions being assembled before they are scheduled
use crate::domain::{Task, Workflow, WorkflowId};
use crate::error::{AppError, Result};
use std::collections::{BTreeMap, HashSet};
use tracing::info;

/// Transient in-memory set of workflow definitions
///
/// Once a workflow is handed to the scheduler it is marked scheduled and can
/// no longer be modified here; the persisted copy is authoritative.
#[derive(Debug, Default)]
pub struct WorkflowCatalog {
    workflows: BTreeMap<WorkflowId, Workflow>,
    scheduled: HashSet<WorkflowId>,
}

impl WorkflowCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new workflow
    ///
    /// # Errors
    /// - AppError::DuplicateWorkflowId if the id is taken
    pub fn create(&mut self, workflow: Workflow) -> Result<()> {
        if self.workflows.contains_key(&workflow.id) {
            return Err(AppError::DuplicateWorkflowId(workflow.id));
        }
        self.insert(workflow)
    }

    /// Register a workflow, replacing any definition with the same id
    pub fn create_or_replace(&mut self, workflow: Workflow) -> Result<()> {
        self.scheduled.remove(&workflow.id);
        self.insert(workflow)
    }

    fn insert(&mut self, workflow: Workflow) -> Result<()> {
        workflow.validate()?;
        info!(workflow_id = %workflow.id, tasks = %workflow.tasks.len(), "Workflow registered");
        self.workflows.insert(workflow.id.clone(), workflow);
        Ok(())
    }

    /// Append a task to an unscheduled workflow
    pub fn add_task(&mut self, workflow_id: &str, task: Task) -> Result<()> {
        if self.scheduled.contains(workflow_id) {
            return Err(AppError::WorkflowScheduled(workflow_id.to_string()));
        }
        let workflow = self
            .workflows
            .get_mut(workflow_id)
            .ok_or_else(|| AppError::WorkflowNotFound(workflow_id.to_string()))?;
        workflow.add_task(task)?;
        Ok(())
    }

    pub fn get(&self, workflow_id: &str) -> Option<&Workflow> {
        self.workflows.get(workflow_id)
    }

    /// All workflows, ordered by id
    pub fn list(&self) -> impl Iterator<Item = &Workflow> {
        self.workflows.values()
    }

    pub fn is_scheduled(&self, workflow_id: &str) -> bool {
        self.scheduled.contains(workflow_id)
    }

    /// Freeze a workflow after it was handed to the scheduler
    pub fn mark_scheduled(&mut self, workflow_id: &str) -> Result<&Workflow> {
        let workflow = self
            .workflows
            .get(workflow_id)
            .ok_or_else(|| AppError::WorkflowNotFound(workflow_id.to_string()))?;
        self.scheduled.insert(workflow_id.to_string());
        Ok(workflow)
    }

    pub fn remove(&mut self, workflow_id: &str) -> Option<Workflow> {
        self.scheduled.remove(workflow_id);
        self.workflows.remove(workflow_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_workflow_rejected_without_override() {
        let mut catalog = WorkflowCatalog::new();
        catalog.create(Workflow::new("backup").unwrap()).unwrap();

        let err = catalog.create(Workflow::new("backup").unwrap()).unwrap_err();
        assert!(matches!(err, AppError::DuplicateWorkflowId(id) if id == "backup"));

        let replacement = Workflow::new("backup")
            .unwrap()
            .with_task(Task::new("t", "true"))
            .unwrap();
        catalog.create_or_replace(replacement).unwrap();
        assert_eq!(catalog.get("backup").unwrap().tasks.len(), 1);
    }

    #[test]
    fn test_scheduled_workflow_is_frozen() {
        let mut catalog = WorkflowCatalog::new();
        catalog.create(Workflow::new("etl").unwrap()).unwrap();
        catalog.add_task("etl", Task::new("extract", "extract")).unwrap();
        catalog.mark_scheduled("etl").unwrap();

        let err = catalog
            .add_task("etl", Task::new("load", "load"))
            .unwrap_err();
        assert!(matches!(err, AppError::WorkflowScheduled(_)));
        assert!(catalog.is_scheduled("etl"));
    }

    #[test]
    fn test_add_task_to_unknown_workflow() {
        let mut catalog = WorkflowCatalog::new();
        let err = catalog.add_task("ghost", Task::new("t", "true")).unwrap_err();
        assert!(matches!(err, AppError::WorkflowNotFound(_)));
    }

    #[test]
    fn test_duplicate_task_surfaces_domain_error() {
        let mut catalog = WorkflowCatalog::new();
        catalog.create(Workflow::new("wf").unwrap()).unwrap();
        catalog.add_task("wf", Task::new("t", "true")).unwrap();
        let err = catalog.add_task("wf", Task::new("t", "false")).unwrap_err();
        assert!(matches!(err, AppError::Domain(_)));
    }
}
