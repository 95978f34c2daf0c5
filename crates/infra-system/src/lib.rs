// Batchflow Infrastructure - Platform Adapters
// Implements: ProcessRunner, FileProbe, WorkflowLauncher (process pool)

pub mod file_probe;
pub mod process_launcher;
pub mod subprocess_runner;

pub use file_probe::PlatformFileProbe;
pub use process_launcher::IsolatedProcessLauncher;
pub use subprocess_runner::SubprocessRunner;
