// Schedule Binding Domain Model

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::domain::error::{DomainError, Result};
use crate::domain::pool::PoolKind;
use crate::domain::trigger::TriggerSpec;
use crate::domain::workflow::WorkflowId;

/// Binding identifier (by convention `workflow_{workflow_id}`)
pub type JobId = String;

/// Binding lifecycle. `Completed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindingState {
    Active,
    Paused,
    Completed,
}

impl std::fmt::Display for BindingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindingState::Active => write!(f, "active"),
            BindingState::Paused => write!(f, "paused"),
            BindingState::Completed => write!(f, "completed"),
        }
    }
}

impl FromStr for BindingState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "active" => Ok(BindingState::Active),
            "paused" => Ok(BindingState::Paused),
            "completed" => Ok(BindingState::Completed),
            other => Err(DomainError::ValidationError(format!(
                "unknown binding state '{}'",
                other
            ))),
        }
    }
}

/// Ties one workflow to one trigger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleBinding {
    pub id: JobId,
    pub workflow_id: WorkflowId,
    pub trigger_spec: TriggerSpec,
    pub state: BindingState,
    #[serde(default)]
    pub pool: PoolKind,

    /// Interval anchor (epoch ms); the time the binding was created
    pub anchor_at: i64,

    /// Next scheduled fire (epoch ms); `None` once the trigger is exhausted
    pub next_fire_time: Option<i64>,
}

impl ScheduleBinding {
    /// Create an active binding
    pub fn new(
        id: impl Into<String>,
        workflow_id: impl Into<String>,
        trigger_spec: TriggerSpec,
        pool: PoolKind,
        anchor_at: i64,
        next_fire_time: Option<i64>,
    ) -> Self {
        Self {
            id: id.into(),
            workflow_id: workflow_id.into(),
            trigger_spec,
            state: BindingState::Active,
            pool,
            anchor_at,
            next_fire_time,
        }
    }

    /// Default binding id for a workflow
    pub fn default_id(workflow_id: &str) -> JobId {
        format!("workflow_{}", workflow_id)
    }

    pub fn is_active(&self) -> bool {
        self.state == BindingState::Active
    }

    pub fn is_completed(&self) -> bool {
        self.state == BindingState::Completed
    }

    /// Active and its next fire time has been reached
    pub fn is_due(&self, now_millis: i64) -> bool {
        self.is_active() && self.next_fire_time.is_some_and(|at| at <= now_millis)
    }

    /// Active -> Paused (pausing a paused binding is a no-op)
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            BindingState::Active | BindingState::Paused => {
                self.state = BindingState::Paused;
                Ok(())
            }
            BindingState::Completed => Err(self.invalid_transition(BindingState::Paused)),
        }
    }

    /// Paused -> Active with a freshly computed next fire time
    pub fn resume(&mut self, next_fire_time: Option<i64>) -> Result<()> {
        match self.state {
            BindingState::Active | BindingState::Paused => {
                self.state = BindingState::Active;
                self.next_fire_time = next_fire_time;
                Ok(())
            }
            BindingState::Completed => Err(self.invalid_transition(BindingState::Active)),
        }
    }

    /// Trigger exhausted; the binding will never fire again
    pub fn complete(&mut self) {
        self.state = BindingState::Completed;
        self.next_fire_time = None;
    }

    fn invalid_transition(&self, to: BindingState) -> DomainError {
        DomainError::InvalidStateTransition {
            from: self.state.to_string(),
            to: to.to_string(),
        }
    }
}
