// Bounded worker pools
use crate::domain::PoolKind;
use crate::port::WorkflowLauncher;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// A fixed number of run slots backed by one launcher
///
/// Slots are reserved without waiting: a full pool is backpressure, never a
/// queue.
pub struct WorkerPool {
    kind: PoolKind,
    capacity: usize,
    slots: Arc<Semaphore>,
    launcher: Arc<dyn WorkflowLauncher>,
}

impl WorkerPool {
    pub fn new(kind: PoolKind, capacity: usize, launcher: Arc<dyn WorkflowLauncher>) -> Self {
        Self {
            kind,
            capacity,
            slots: Arc::new(Semaphore::new(capacity)),
            launcher,
        }
    }

    pub fn kind(&self) -> PoolKind {
        self.kind
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Take a slot if one is free; the slot is released when the permit drops
    pub fn try_reserve(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.slots).try_acquire_owned().ok()
    }

    pub fn launcher(&self) -> Arc<dyn WorkflowLauncher> {
        Arc::clone(&self.launcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Workflow, WorkflowResult};
    use crate::port::DispatchError;
    use crate::shutdown::ShutdownToken;
    use async_trait::async_trait;

    struct NoopLauncher;

    #[async_trait]
    impl WorkflowLauncher for NoopLauncher {
        async fn launch(
            &self,
            _workflow: Arc<Workflow>,
            _run_id: String,
            _cancel: ShutdownToken,
        ) -> Result<WorkflowResult, DispatchError> {
            Err(DispatchError::Spawn("noop".to_string()))
        }
    }

    #[test]
    fn test_reserve_until_full_then_release() {
        let pool = WorkerPool::new(PoolKind::Process, 2, Arc::new(NoopLauncher));

        let a = pool.try_reserve().unwrap();
        let _b = pool.try_reserve().unwrap();
        assert!(pool.try_reserve().is_none());
        assert_eq!(pool.available(), 0);

        drop(a);
        assert_eq!(pool.available(), 1);
        assert!(pool.try_reserve().is_some());
    }
}
