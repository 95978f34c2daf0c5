//! Batchflow - Main Entry Point
//! `serve`: scheduler daemon; `run-workflow`: one isolated run for the process pool

mod config;
mod definitions;
mod telemetry;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tracing::{error, info, warn};

use batchflow_core::application::{
    InProcessLauncher, PollingReadinessMonitor, SchedulerCore, TaskExecutor, TracingListener,
    WorkflowCatalog, WorkflowEngine,
};
use batchflow_core::domain::Workflow;
use batchflow_core::port::{SystemTimeProvider, UuidProvider};
use batchflow_core::shutdown::shutdown_channel;
use batchflow_infra_sqlite::{create_pool, run_migrations, SqliteJobStore};
use batchflow_infra_system::{IsolatedProcessLauncher, PlatformFileProbe, SubprocessRunner};

use config::{DaemonConfig, LogArgs, ServeArgs};
use telemetry::Console;

#[derive(Debug, Parser)]
#[command(name = "batchflow", version, about = "Workflow scheduler for batch jobs")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the scheduler daemon (default)
    Serve,
    /// Execute one workflow read from stdin and print its result as JSON
    #[command(hide = true)]
    RunWorkflow {
        #[arg(long)]
        run_id: String,

        #[command(flatten)]
        log: LogArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::RunWorkflow { run_id, log }) => {
            let _guard = telemetry::init(&log, Console::Stderr)?;
            run_workflow(run_id).await
        }
        Some(Command::Serve) | None => {
            let _guard = telemetry::init(&cli.serve.log, Console::Stdout)?;
            serve(DaemonConfig::from_args(&cli.serve)?).await
        }
    }
}

/// Task execution stack shared by both modes
fn build_engine() -> Arc<WorkflowEngine> {
    let runner = Arc::new(SubprocessRunner::new());
    let monitor = Arc::new(PollingReadinessMonitor::new(Arc::new(PlatformFileProbe::new())));
    Arc::new(WorkflowEngine::new(
        TaskExecutor::new(runner, monitor),
        Arc::new(SystemTimeProvider),
    ))
}

async fn serve(config: DaemonConfig) -> Result<()> {
    info!("Batchflow v{} starting...", batchflow_core::VERSION);

    // 1. Initialize database
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("cannot create {}", parent.display()))?;
    }
    info!(db_path = %config.db_path.display(), "Initializing database...");
    let pool = create_pool(&config.database_url())
        .await
        .context("DB pool creation failed")?;
    run_migrations(&pool).await.context("Migration failed")?;

    // 2. Setup dependencies (DI wiring)
    let store = Arc::new(SqliteJobStore::new(pool.clone()));
    let thread_launcher = Arc::new(InProcessLauncher::new(build_engine()));
    let process_launcher = Arc::new(
        IsolatedProcessLauncher::current_exe().context("cannot locate own executable")?,
    );

    let scheduler = SchedulerCore::new(
        config.scheduler.clone(),
        store,
        thread_launcher,
        process_launcher,
        Arc::new(TracingListener),
        Arc::new(SystemTimeProvider),
        Arc::new(UuidProvider),
    )?;

    // 3. Restore persisted jobs
    let restored = scheduler.restore().await.context("Restoring jobs failed")?;
    info!(restored_jobs = restored, "Jobs restored from store");

    // 4. Import definitions
    let mut catalog = WorkflowCatalog::new();
    if let Some(path) = &config.workflows_file {
        let loaded = definitions::load(path)?;
        let summary = definitions::import(loaded, &mut catalog, &scheduler).await;
        info!(
            registered = summary.registered,
            scheduled = summary.scheduled,
            kept = summary.kept,
            rejected = summary.rejected,
            "Workflow definitions imported"
        );
    }

    for job in scheduler.list_jobs().await.iter() {
        info!(
            job_id = %job.id,
            workflow_id = %job.workflow_id,
            trigger = %job.trigger,
            state = %job.state,
            next_fire_time = ?job.next_fire_time,
            "Scheduled job"
        );
    }

    // 5. Start dispatching
    scheduler.start();
    info!("System ready. Press Ctrl+C to shutdown");

    wait_for_shutdown_signal().await?;
    info!(mode = ?config.shutdown_mode, "Shutdown signal received");

    scheduler.shutdown(config.shutdown_mode).await;
    pool.close().await;

    info!("Shutdown complete.");
    Ok(())
}

/// Child side of the process pool
///
/// SIGTERM stops the run after its current task; the (cancelled) result is
/// still printed so the parent can report it.
async fn run_workflow(run_id: String) -> Result<()> {
    let mut input = String::new();
    tokio::io::stdin()
        .read_to_string(&mut input)
        .await
        .context("cannot read workflow from stdin")?;
    let workflow: Workflow = serde_json::from_str(&input).context("invalid workflow JSON")?;
    workflow.validate()?;

    let (stop, cancel) = shutdown_channel();
    tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(()) => stop.shutdown(),
            Err(e) => warn!(error = %e, "Signal handler unavailable"),
        }
    });

    let result = build_engine().run(&workflow, &run_id, &cancel).await;
    if !result.overall_succeeded {
        error!(
            workflow_id = %result.workflow_id,
            run_id = %run_id,
            halted_at_task_id = ?result.halted_at_task_id,
            "Isolated run failed"
        );
    }

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

/// Block until Ctrl+C or (on Unix) SIGTERM
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    Ok(())
}
