// Subprocess runner implementation
// reason: tokio::process for non-blocking child management on pool workers
use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tracing::{debug, info};

use batchflow_core::port::process_runner::{LaunchError, ProcessOutput, ProcessRunner};

/// Exit code reported when a child ended without one (non-Unix signal death)
const UNKNOWN_EXIT_CODE: i32 = -1;

/// Spawns each task command as a child process and waits for it to exit
///
/// The child inherits the daemon environment unless an allowlist is set,
/// in which case only the listed variables are passed through.
#[derive(Debug, Clone, Default)]
pub struct SubprocessRunner {
    env_allowlist: Option<Vec<String>>,
    working_dir: Option<PathBuf>,
}

impl SubprocessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the child environment to these variables
    pub fn with_env_allowlist(mut self, allowlist: Vec<String>) -> Self {
        self.env_allowlist = Some(allowlist);
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn build_command(&self, command: &str, args: &[String]) -> Command {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        if let Some(allowlist) = &self.env_allowlist {
            cmd.env_clear();
            cmd.envs(std::env::vars().filter(|(k, _)| allowlist.contains(k)));
        }
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

fn map_spawn_error(command: &str, err: io::Error) -> LaunchError {
    match err.kind() {
        io::ErrorKind::NotFound => LaunchError::NotFound(command.to_string()),
        io::ErrorKind::PermissionDenied => LaunchError::PermissionDenied(command.to_string()),
        _ => LaunchError::Spawn(format!("{}: {}", command, err)),
    }
}

/// Exit code of a finished child; Unix signal deaths map to `128 + signal`
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    UNKNOWN_EXIT_CODE
}

#[async_trait]
impl ProcessRunner for SubprocessRunner {
    async fn run(&self, command: &str, args: &[String]) -> Result<ProcessOutput, LaunchError> {
        debug!(command = %command, args = ?args, "Spawning subprocess");

        let child = self
            .build_command(command, args)
            .spawn()
            .map_err(|e| map_spawn_error(command, e))?;

        info!(command = %command, pid = ?child.id(), "Subprocess started");

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| LaunchError::Io(e.to_string()))?;

        let exit_code = exit_code(output.status);
        debug!(command = %command, exit_code = %exit_code, "Subprocess exited");

        Ok(ProcessOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn test_captures_exit_code_and_output() {
        let runner = SubprocessRunner::new();

        let output = runner
            .run("sh", &sh("echo hello; echo oops >&2; exit 3"))
            .await
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "hello");
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_missing_command_is_launch_error() {
        let err = SubprocessRunner::new()
            .run("/definitely/not/a/binary", &[])
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LaunchError::NotFound("/definitely/not/a/binary".to_string())
        );
    }

    #[tokio::test]
    async fn test_non_executable_is_permission_denied() {
        let path = std::env::temp_dir().join(format!("batchflow-noexec-{}", uuid::Uuid::new_v4()));
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();

        let err = SubprocessRunner::new()
            .run(path.to_str().unwrap(), &[])
            .await
            .unwrap_err();
        std::fs::remove_file(&path).ok();

        assert!(matches!(err, LaunchError::PermissionDenied(_)));
    }

    #[tokio::test]
    async fn test_signal_death_maps_to_shell_convention() {
        let output = SubprocessRunner::new()
            .run("sh", &sh("kill -TERM $$"))
            .await
            .unwrap();
        assert_eq!(output.exit_code, 128 + 15);
    }

    #[tokio::test]
    async fn test_env_allowlist() {
        std::env::set_var("BATCHFLOW_TEST_VISIBLE", "yes");
        std::env::set_var("BATCHFLOW_TEST_HIDDEN", "no");
        let runner = SubprocessRunner::new().with_env_allowlist(vec![
            "PATH".to_string(),
            "BATCHFLOW_TEST_VISIBLE".to_string(),
        ]);

        let output = runner
            .run(
                "sh",
                &sh("echo \"${BATCHFLOW_TEST_VISIBLE:-unset} ${BATCHFLOW_TEST_HIDDEN:-unset}\""),
            )
            .await
            .unwrap();
        assert_eq!(output.stdout.trim(), "yes unset");
    }
}
