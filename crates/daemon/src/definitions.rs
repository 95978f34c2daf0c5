//! Workflow definitions file
//!
//! ```json
//! {
//!   "workflows": [
//!     {
//!       "id": "nightly_export",
//!       "output_timeout_seconds": 120,
//!       "tasks": [
//!         { "id": "dump", "command": "pg_dump", "args": ["-f", "/data/db.sql"],
//!           "output_files": ["/data/db.sql"], "retry_count": 2, "retry_delay_seconds": 30 }
//!       ],
//!       "schedule": { "type": "cron", "day_of_week": "mon-fri", "hour": 2, "minute": 0 },
//!       "pool": "process"
//!     }
//!   ]
//! }
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use batchflow_core::application::{AddJobOptions, SchedulerCore, WorkflowCatalog};
use batchflow_core::domain::{PoolKind, ScheduleBinding, TriggerSpec, Workflow};

#[derive(Debug, Deserialize)]
pub struct DefinitionsFile {
    #[serde(default)]
    pub workflows: Vec<WorkflowDefinition>,
}

#[derive(Debug, Deserialize)]
pub struct WorkflowDefinition {
    #[serde(flatten)]
    pub workflow: Workflow,
    /// Without a schedule the workflow is only registered
    #[serde(default)]
    pub schedule: Option<TriggerSpec>,
    #[serde(default)]
    pub pool: PoolKind,
    /// Defaults to `workflow_<id>`
    #[serde(default)]
    pub job_id: Option<String>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub registered: usize,
    pub scheduled: usize,
    /// Jobs already restored from the store; the stored binding wins
    pub kept: usize,
    pub rejected: usize,
}

pub fn load(path: &Path) -> Result<DefinitionsFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read workflow definitions {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("invalid workflow definitions {}", path.display()))
}

/// Register every definition and schedule those with a trigger
///
/// A bad entry is logged and skipped; it never prevents the others.
pub async fn import(
    definitions: DefinitionsFile,
    catalog: &mut WorkflowCatalog,
    scheduler: &SchedulerCore,
) -> ImportSummary {
    let mut summary = ImportSummary::default();

    for definition in definitions.workflows {
        let workflow_id = definition.workflow.id.clone();
        if let Err(e) = catalog.create(definition.workflow) {
            warn!(workflow_id = %workflow_id, error = %e, "Workflow definition rejected");
            summary.rejected += 1;
            continue;
        }
        summary.registered += 1;

        let Some(schedule) = definition.schedule else {
            continue;
        };
        let job_id = definition
            .job_id
            .unwrap_or_else(|| ScheduleBinding::default_id(&workflow_id));

        if scheduler.get_job(&job_id).await.is_some() {
            info!(job_id = %job_id, workflow_id = %workflow_id, "Job restored from store, definition not re-applied");
            summary.kept += 1;
            continue;
        }

        let workflow = match catalog.mark_scheduled(&workflow_id) {
            Ok(workflow) => workflow.clone(),
            Err(e) => {
                warn!(workflow_id = %workflow_id, error = %e, "Workflow vanished from catalog");
                summary.rejected += 1;
                continue;
            }
        };

        let options = AddJobOptions::default().on_pool(definition.pool);
        match scheduler.add_job(workflow, schedule, job_id.clone(), options).await {
            Ok(_) => summary.scheduled += 1,
            Err(e) => {
                warn!(job_id = %job_id, error = %e, "Schedule rejected");
                catalog.remove(&workflow_id);
                summary.rejected += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use batchflow_core::application::{InProcessLauncher, SchedulerConfig, TracingListener};
    use batchflow_core::application::{PollingReadinessMonitor, TaskExecutor, WorkflowEngine};
    use batchflow_core::domain::BindingState;
    use batchflow_core::port::id_provider::mocks::SequentialIdProvider;
    use batchflow_core::port::process_runner::mocks::ScriptedProcessRunner;
    use batchflow_core::port::readiness::mocks::ScriptedFileProbe;
    use batchflow_core::port::time_provider::mocks::ManualTimeProvider;
    use batchflow_core::port::InMemoryJobStore;
    use std::sync::Arc;

    const DEFINITIONS: &str = r#"{
        "workflows": [
            {
                "id": "export",
                "tasks": [{ "id": "dump", "command": "pg_dump" }],
                "schedule": { "type": "interval", "minutes": 30 },
                "pool": "process"
            },
            {
                "id": "adhoc",
                "tasks": [{ "id": "one", "command": "true" }]
            },
            {
                "id": "broken",
                "tasks": [{ "id": "x", "command": "true" }],
                "schedule": { "type": "cron", "day_of_week": "funday", "hour": 1, "minute": 0 }
            }
        ]
    }"#;

    fn scheduler() -> SchedulerCore {
        let clock = Arc::new(ManualTimeProvider::new(1_772_442_000_000));
        let engine = Arc::new(WorkflowEngine::new(
            TaskExecutor::new(
                Arc::new(ScriptedProcessRunner::new()),
                Arc::new(PollingReadinessMonitor::new(Arc::new(
                    ScriptedFileProbe::default(),
                ))),
            ),
            clock.clone(),
        ));
        let launcher = Arc::new(InProcessLauncher::new(engine));
        SchedulerCore::new(
            SchedulerConfig::default(),
            Arc::new(InMemoryJobStore::new()),
            launcher.clone(),
            launcher,
            Arc::new(TracingListener),
            clock,
            Arc::new(SequentialIdProvider::default()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_import_registers_and_schedules() {
        let definitions: DefinitionsFile = serde_json::from_str(DEFINITIONS).unwrap();
        let mut catalog = WorkflowCatalog::new();
        let scheduler = scheduler();

        let summary = import(definitions, &mut catalog, &scheduler).await;

        assert_eq!(
            summary,
            ImportSummary {
                registered: 3,
                scheduled: 1,
                kept: 0,
                rejected: 1,
            }
        );
        let job = scheduler.get_job("workflow_export").await.unwrap();
        assert_eq!(job.pool, PoolKind::Process);
        assert_eq!(job.state, BindingState::Active);
        assert!(catalog.is_scheduled("export"));
        assert!(catalog.get("adhoc").is_some());
        assert!(catalog.get("broken").is_none());
    }

    #[tokio::test]
    async fn test_existing_job_is_kept() {
        let scheduler = scheduler();
        let mut catalog = WorkflowCatalog::new();
        import(
            serde_json::from_str(DEFINITIONS).unwrap(),
            &mut catalog,
            &scheduler,
        )
        .await;
        scheduler.pause_job("workflow_export").await.unwrap();

        let summary = import(
            serde_json::from_str(DEFINITIONS).unwrap(),
            &mut WorkflowCatalog::new(),
            &scheduler,
        )
        .await;

        assert_eq!(summary.kept, 1);
        let job = scheduler.get_job("workflow_export").await.unwrap();
        assert_eq!(job.state, BindingState::Paused);
    }

    #[test]
    fn test_task_defaults_apply() {
        let definitions: DefinitionsFile = serde_json::from_str(DEFINITIONS).unwrap();
        let task = &definitions.workflows[0].workflow.tasks[0];
        assert!(task.accepts_exit_code(0));
        assert_eq!(task.retry_count, 0);
        assert_eq!(definitions.workflows[1].pool, PoolKind::Thread);
    }
}
