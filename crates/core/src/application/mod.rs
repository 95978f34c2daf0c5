// Application Layer - Use Cases and Business Logic

pub mod catalog;
pub mod constants;
pub mod engine;
pub mod listener;
pub mod readiness;
pub mod recovery;
pub mod retry;
pub mod scheduler;
pub mod task_executor;

// Re-exports
pub use catalog::WorkflowCatalog;
pub use engine::{InProcessLauncher, WorkflowEngine};
pub use listener::TracingListener;
pub use readiness::PollingReadinessMonitor;
pub use recovery::{RecoveredJob, RecoveryService};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{
    AddJobOptions, JobListing, JobSummary, SchedulerConfig, SchedulerCore, ShutdownMode,
    WorkerPool,
};
pub use task_executor::{TaskExecutor, TaskRun};
