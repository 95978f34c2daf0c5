// Execution Listener Port
// Sink for dispatch, completion and error events of scheduled runs

use serde::Serialize;

use crate::domain::{JobId, PoolKind, WorkflowId, WorkflowResult};

/// Event raised by the scheduler
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SchedulerEvent {
    JobDispatched {
        id: JobId,
        workflow_id: WorkflowId,
        run_id: String,
        pool: PoolKind,
    },
    /// No free pool slot; the fire is retried on the next tick
    JobSkippedBackpressure { id: JobId, pool: PoolKind },
    /// The binding already has `running` runs in flight
    JobSkippedMaxInstances { id: JobId, running: usize },
    /// The fire was later than the misfire grace period and was dropped
    JobMissed { id: JobId, scheduled_for: i64 },
    /// A date binding fired its single run and was removed
    JobRetired { id: JobId },
    WorkflowCompleted { id: JobId, result: WorkflowResult },
    /// The run crashed or could not be launched
    WorkflowError { id: JobId, error: String },
}

impl SchedulerEvent {
    pub fn job_id(&self) -> &str {
        match self {
            SchedulerEvent::JobDispatched { id, .. }
            | SchedulerEvent::JobSkippedBackpressure { id, .. }
            | SchedulerEvent::JobSkippedMaxInstances { id, .. }
            | SchedulerEvent::JobMissed { id, .. }
            | SchedulerEvent::JobRetired { id }
            | SchedulerEvent::WorkflowCompleted { id, .. }
            | SchedulerEvent::WorkflowError { id, .. } => id,
        }
    }
}

/// Must not block: called from the dispatch loop and pool workers
pub trait ExecutionListener: Send + Sync {
    fn on_event(&self, event: &SchedulerEvent);
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Keeps every event for later assertions
    #[derive(Default)]
    pub struct RecordingListener {
        events: Mutex<Vec<SchedulerEvent>>,
    }

    impl RecordingListener {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn events(&self) -> Vec<SchedulerEvent> {
            self.events.lock().unwrap().clone()
        }

        pub fn completed(&self) -> Vec<WorkflowResult> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SchedulerEvent::WorkflowCompleted { result, .. } => Some(result),
                    _ => None,
                })
                .collect()
        }
    }

    impl ExecutionListener for RecordingListener {
        fn on_event(&self, event: &SchedulerEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    /// Forwards events into a channel so tests can await them
    pub struct ChannelListener {
        tx: mpsc::UnboundedSender<SchedulerEvent>,
    }

    impl ChannelListener {
        pub fn new() -> (Self, mpsc::UnboundedReceiver<SchedulerEvent>) {
            let (tx, rx) = mpsc::unbounded_channel();
            (Self { tx }, rx)
        }
    }

    impl ExecutionListener for ChannelListener {
        fn on_event(&self, event: &SchedulerEvent) {
            let _ = self.tx.send(event.clone());
        }
    }
}
