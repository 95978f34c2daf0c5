// Port Layer - Interfaces for external dependencies

pub mod execution_listener;
pub mod id_provider; // For deterministic testing
pub mod job_store;
pub mod process_runner;
pub mod readiness;
pub mod time_provider;
pub mod workflow_launcher;

// Re-exports
pub use execution_listener::{ExecutionListener, SchedulerEvent};
pub use id_provider::{IdProvider, UuidProvider};
pub use job_store::{memory::InMemoryJobStore, JobStore};
pub use process_runner::{LaunchError, ProcessOutput, ProcessRunner};
pub use readiness::{FileCheckError, FileProbe, FileReadinessMonitor, FileStatus, Readiness};
pub use time_provider::{SystemTimeProvider, TimeProvider};
pub use workflow_launcher::{DispatchError, WorkflowLauncher};
