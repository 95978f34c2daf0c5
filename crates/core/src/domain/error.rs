// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid schedule spec: {0}")]
    InvalidScheduleSpec(String),

    #[error("Invalid binding state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Duplicate task id '{task_id}' in workflow '{workflow_id}'")]
    DuplicateTaskId {
        workflow_id: String,
        task_id: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
