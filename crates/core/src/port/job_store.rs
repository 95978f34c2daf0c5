// Job Store Port (Interface)

use crate::domain::{BindingState, JobId, ScheduleBinding, Workflow, WorkflowId};
use crate::error::Result;
use async_trait::async_trait;

/// Durable record store for schedule bindings and workflow definitions
///
/// Every operation is atomic per record.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or overwrite a binding
    async fn put(&self, binding: &ScheduleBinding) -> Result<()>;

    /// Find binding by ID
    async fn get(&self, id: &str) -> Result<Option<ScheduleBinding>>;

    /// Delete a binding; returns whether it existed
    async fn delete(&self, id: &str) -> Result<bool>;

    /// All bindings, ordered by id
    async fn list(&self) -> Result<Vec<ScheduleBinding>>;

    /// Update state and next fire time of an existing binding
    ///
    /// # Errors
    /// - AppError::JobNotFound if the binding does not exist
    async fn update_state(
        &self,
        id: &str,
        state: BindingState,
        next_fire_time: Option<i64>,
    ) -> Result<()>;

    /// Insert or overwrite a workflow definition
    async fn put_workflow(&self, workflow: &Workflow) -> Result<()>;

    async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>>;

    async fn delete_workflow(&self, id: &str) -> Result<bool>;
}

/// Process-local store for tests and embedding
pub mod memory {
    use super::*;
    use crate::error::AppError;
    use std::collections::BTreeMap;
    use tokio::sync::RwLock;

    #[derive(Default)]
    pub struct InMemoryJobStore {
        bindings: RwLock<BTreeMap<JobId, ScheduleBinding>>,
        workflows: RwLock<BTreeMap<WorkflowId, Workflow>>,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn put(&self, binding: &ScheduleBinding) -> Result<()> {
            self.bindings
                .write()
                .await
                .insert(binding.id.clone(), binding.clone());
            Ok(())
        }

        async fn get(&self, id: &str) -> Result<Option<ScheduleBinding>> {
            Ok(self.bindings.read().await.get(id).cloned())
        }

        async fn delete(&self, id: &str) -> Result<bool> {
            Ok(self.bindings.write().await.remove(id).is_some())
        }

        async fn list(&self) -> Result<Vec<ScheduleBinding>> {
            Ok(self.bindings.read().await.values().cloned().collect())
        }

        async fn update_state(
            &self,
            id: &str,
            state: BindingState,
            next_fire_time: Option<i64>,
        ) -> Result<()> {
            let mut bindings = self.bindings.write().await;
            let binding = bindings
                .get_mut(id)
                .ok_or_else(|| AppError::JobNotFound(id.to_string()))?;
            binding.state = state;
            binding.next_fire_time = next_fire_time;
            Ok(())
        }

        async fn put_workflow(&self, workflow: &Workflow) -> Result<()> {
            self.workflows
                .write()
                .await
                .insert(workflow.id.clone(), workflow.clone());
            Ok(())
        }

        async fn get_workflow(&self, id: &str) -> Result<Option<Workflow>> {
            Ok(self.workflows.read().await.get(id).cloned())
        }

        async fn delete_workflow(&self, id: &str) -> Result<bool> {
            Ok(self.workflows.write().await.remove(id).is_some())
        }
    }
}
