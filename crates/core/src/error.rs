// Central Error Type for the Application

use thiserror::Error;

/// Application-level error type
///
/// Only binding-table contract violations surface here from scheduler
/// operations. Failures inside a workflow run are captured into
/// `TaskResult`/`WorkflowResult` and never travel through this type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Domain error: {0}")]
    Domain(#[from] crate::domain::DomainError),

    #[error("Duplicate job id: {0}")]
    DuplicateJobId(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Duplicate workflow id: {0}")]
    DuplicateWorkflowId(String),

    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    #[error("Workflow '{0}' is scheduled and can no longer be modified")]
    WorkflowScheduled(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Job '{id}' is {state} and cannot be {action}")]
    InvalidJobState {
        id: String,
        state: String,
        action: &'static str,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// True when the error is an `InvalidScheduleSpec` raised by trigger validation
    pub fn is_invalid_schedule(&self) -> bool {
        matches!(
            self,
            AppError::Domain(crate::domain::DomainError::InvalidScheduleSpec(_))
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

// Note: sqlx::Error conversion is handled in the infra-sqlite crate
// by converting to AppError::Database(String)
