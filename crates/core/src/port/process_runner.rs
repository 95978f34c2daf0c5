// Process Runner Port
// Abstraction for launching one external command and collecting its output

use async_trait::async_trait;
use thiserror::Error;

/// Captured outcome of a process that ran to completion
///
/// A non-zero exit code is normal data here, not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn exited(exit_code: i32) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

/// The command could not be started
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LaunchError {
    #[error("command not found: {0}")]
    NotFound(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("spawn failed: {0}")]
    Spawn(String),

    #[error("IO error while collecting output: {0}")]
    Io(String),
}

/// Process Runner trait
///
/// Implementations:
/// - SubprocessRunner (infra-system): spawns a real child process
/// - ScriptedProcessRunner (mocks): canned responses for tests
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` with `args` until it exits
    ///
    /// No timeout is applied here; callers own any deadline.
    async fn run(&self, command: &str, args: &[String]) -> Result<ProcessOutput, LaunchError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// Scripted behaviour of one invocation
    #[derive(Clone)]
    pub enum ScriptedResponse {
        Exit(ProcessOutput),
        Fail(LaunchError),
        /// Run a side effect (e.g. create an output file) then exit
        Effect(Arc<dyn Fn() -> ProcessOutput + Send + Sync>),
        /// Panic inside the runner (for panic isolation tests)
        Panic(String),
    }

    impl ScriptedResponse {
        pub fn exit(code: i32) -> Self {
            ScriptedResponse::Exit(ProcessOutput::exited(code))
        }

        pub fn effect(f: impl Fn() -> ProcessOutput + Send + Sync + 'static) -> Self {
            ScriptedResponse::Effect(Arc::new(f))
        }
    }

    impl std::fmt::Debug for ScriptedResponse {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                ScriptedResponse::Exit(output) => f.debug_tuple("Exit").field(output).finish(),
                ScriptedResponse::Fail(err) => f.debug_tuple("Fail").field(err).finish(),
                ScriptedResponse::Effect(_) => write!(f, "Effect(..)"),
                ScriptedResponse::Panic(msg) => f.debug_tuple("Panic").field(msg).finish(),
            }
        }
    }

    /// Runner with per-command response queues
    ///
    /// Each call pops the next response queued for the command; once a queue
    /// is drained its last response repeats. Unknown commands exit with 0.
    #[derive(Default)]
    pub struct ScriptedProcessRunner {
        responses: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
        calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl ScriptedProcessRunner {
        pub fn new() -> Self {
            Self::default()
        }

        /// Queue responses for a command
        pub fn script(
            self,
            command: impl Into<String>,
            responses: impl IntoIterator<Item = ScriptedResponse>,
        ) -> Self {
            self.responses
                .lock()
                .unwrap()
                .entry(command.into())
                .or_default()
                .extend(responses);
            self
        }

        /// Every invocation so far, in order
        pub fn calls(&self) -> Vec<(String, Vec<String>)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self, command: &str) -> usize {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(c, _)| c == command)
                .count()
        }

        fn next_response(&self, command: &str) -> ScriptedResponse {
            let mut responses = self.responses.lock().unwrap();
            match responses.get_mut(command) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
                Some(queue) => queue
                    .front()
                    .cloned()
                    .unwrap_or_else(|| ScriptedResponse::exit(0)),
                None => ScriptedResponse::exit(0),
            }
        }
    }

    #[async_trait]
    impl ProcessRunner for ScriptedProcessRunner {
        async fn run(&self, command: &str, args: &[String]) -> Result<ProcessOutput, LaunchError> {
            self.calls
                .lock()
                .unwrap()
                .push((command.to_string(), args.to_vec()));

            match self.next_response(command) {
                ScriptedResponse::Exit(output) => Ok(output),
                ScriptedResponse::Fail(err) => Err(err),
                ScriptedResponse::Effect(f) => Ok(f()),
                ScriptedResponse::Panic(msg) => panic!("{}", msg),
            }
        }
    }
}
