//! Real processes and real files (Unix only)
//!
//! SubprocessRunner + PlatformFileProbe behind the workflow engine.
#![cfg(unix)]

use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use nix::fcntl::{Flock, FlockArg};

use batchflow_core::application::{PollingReadinessMonitor, TaskExecutor, WorkflowEngine};
use batchflow_core::domain::{AttemptFailure, Task, Workflow};
use batchflow_core::port::SystemTimeProvider;
use batchflow_core::shutdown::ShutdownToken;
use batchflow_infra_system::{PlatformFileProbe, SubprocessRunner};

struct Scratch(PathBuf);

impl Scratch {
    fn new() -> Self {
        let dir = std::env::temp_dir().join(format!("batchflow-it-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        Self(dir)
    }

    fn path(&self, name: &str) -> PathBuf {
        self.0.join(name)
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}

fn engine() -> WorkflowEngine {
    let monitor = PollingReadinessMonitor::with_poll_interval(
        Arc::new(PlatformFileProbe::new()),
        Duration::from_millis(50),
    );
    WorkflowEngine::new(
        TaskExecutor::new(Arc::new(SubprocessRunner::new()), Arc::new(monitor)),
        Arc::new(SystemTimeProvider),
    )
}

fn sh(id: &str, script: &str) -> Task {
    Task::new(id, "sh").with_args(["-c", script])
}

#[tokio::test]
async fn produced_output_is_verified() {
    let scratch = Scratch::new();
    let out = scratch.path("report.csv");
    let workflow = Workflow::new("report")
        .unwrap()
        .with_output_timeout(5)
        .with_task(
            sh("write", &format!("printf 'a,b\\n1,2\\n' > '{}'", out.display()))
                .with_output_file(&out)
                .with_fresh_outputs(true),
        )
        .unwrap();

    let result = engine()
        .run(&workflow, "run-1", &ShutdownToken::never())
        .await;

    assert!(result.overall_succeeded, "{result:?}");
    let attempt = &result.task_results[0];
    assert_eq!(attempt.exit_code, Some(0));
    assert!(attempt.output_files_verified);
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "a,b\n1,2\n");
}

#[tokio::test]
async fn output_held_under_lock_times_out_as_locked() {
    let scratch = Scratch::new();
    let out = scratch.path("partial.dat");
    std::fs::write(&out, b"half").unwrap();
    let _writer = Flock::lock(File::open(&out).unwrap(), FlockArg::LockExclusiveNonblock)
        .map_err(|(_, e)| e)
        .unwrap();

    let workflow = Workflow::new("transfer")
        .unwrap()
        .with_output_timeout(1)
        .with_task(Task::new("copy", "true").with_output_file(&out))
        .unwrap();

    let result = engine()
        .run(&workflow, "run-1", &ShutdownToken::never())
        .await;

    assert!(!result.overall_succeeded);
    assert_eq!(
        result.task_results[0].failure,
        Some(AttemptFailure::OutputLocked { path: out.clone() })
    );
}

#[tokio::test]
async fn stale_output_is_not_accepted_when_freshness_is_required() {
    let scratch = Scratch::new();
    let out = scratch.path("yesterday.csv");
    std::fs::write(&out, b"old").unwrap();
    File::options()
        .write(true)
        .open(&out)
        .unwrap()
        .set_modified(SystemTime::now() - Duration::from_secs(24 * 3600))
        .unwrap();

    let workflow = Workflow::new("refresh")
        .unwrap()
        .with_output_timeout(1)
        .with_task(
            Task::new("noop", "true")
                .with_output_file(&out)
                .with_fresh_outputs(true),
        )
        .unwrap();

    let result = engine()
        .run(&workflow, "run-1", &ShutdownToken::never())
        .await;

    assert_eq!(
        result.task_results[0].failure,
        Some(AttemptFailure::OutputStale { path: out.clone() })
    );
}

#[tokio::test]
async fn missing_command_is_a_launch_failure_and_is_retried() {
    let workflow = Workflow::new("broken")
        .unwrap()
        .with_task(Task::new("run", "/definitely/not/installed").with_retries(1, 0))
        .unwrap();

    let result = engine()
        .run(&workflow, "run-1", &ShutdownToken::never())
        .await;

    assert_eq!(result.task_results.len(), 2);
    for attempt in &result.task_results {
        assert_eq!(attempt.exit_code, None);
        assert!(matches!(attempt.failure, Some(AttemptFailure::Launch { .. })));
    }
    assert_eq!(result.halted_at_task_id.as_deref(), Some("run"));
}

#[tokio::test]
async fn expected_exit_codes_and_halting() {
    let workflow = Workflow::new("mixed")
        .unwrap()
        .with_task(sh("warns", "exit 3").with_expected_exit_codes([0, 3]))
        .unwrap()
        .with_task(sh("fails", "echo boom >&2; exit 1"))
        .unwrap()
        .with_task(sh("never", "exit 0"))
        .unwrap();

    let result = engine()
        .run(&workflow, "run-1", &ShutdownToken::never())
        .await;

    assert!(result.task_results[0].succeeded);
    assert_eq!(result.task_results[1].stderr.trim(), "boom");
    assert_eq!(
        result.task_results[1].failure,
        Some(AttemptFailure::UnexpectedExitCode { exit_code: 1 })
    );
    assert_eq!(result.task_results.len(), 2);
    assert_eq!(result.halted_at_task_id.as_deref(), Some("fails"));
}
