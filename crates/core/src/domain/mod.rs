// Domain Layer - Pure business logic and entities

pub mod binding;
pub mod error;
pub mod pool;
pub mod result;
pub mod task;
pub mod trigger;
pub mod workflow;

// Re-exports
pub use binding::{BindingState, JobId, ScheduleBinding};
pub use error::DomainError;
pub use pool::PoolKind;
pub use result::{AttemptFailure, TaskResult, TaskState, WorkflowResult};
pub use task::{Task, TaskId};
pub use trigger::{
    parse_timezone, CronTrigger, DateTrigger, IntervalTrigger, Trigger, TriggerSpec,
};
pub use workflow::{Workflow, WorkflowId, DEFAULT_OUTPUT_TIMEOUT_SECS};
