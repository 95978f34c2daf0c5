//! Daemon configuration
//!
//! Every setting can come from a flag or a `BATCHFLOW_*` environment variable.

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

use batchflow_core::application::constants::{
    DEFAULT_MAX_INSTANCES, DEFAULT_MAX_PROCESSES, DEFAULT_MAX_THREADS,
};
use batchflow_core::application::{SchedulerConfig, ShutdownMode};
use batchflow_core::domain::parse_timezone;

const DEFAULT_DB_PATH: &str = "~/.batchflow/jobs.db";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable, for terminals
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging flags shared by both subcommands
#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    #[arg(long, env = "BATCHFLOW_LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, env = "BATCHFLOW_LOG_FILE")]
    pub log_file: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// SQLite database holding workflows and schedule bindings
    #[arg(long, env = "BATCHFLOW_DB_PATH", default_value = DEFAULT_DB_PATH)]
    pub db_path: String,

    #[arg(long, env = "BATCHFLOW_MAX_THREADS", default_value_t = DEFAULT_MAX_THREADS)]
    pub max_threads: usize,

    #[arg(long, env = "BATCHFLOW_MAX_PROCESSES", default_value_t = DEFAULT_MAX_PROCESSES)]
    pub max_processes: usize,

    /// IANA zone for cron triggers and naive date timestamps
    #[arg(long, env = "BATCHFLOW_TIMEZONE", default_value = "UTC")]
    pub timezone: String,

    /// Concurrent runs allowed per job
    #[arg(long, env = "BATCHFLOW_MAX_INSTANCES", default_value_t = DEFAULT_MAX_INSTANCES)]
    pub max_instances: usize,

    #[arg(long, env = "BATCHFLOW_MISFIRE_GRACE_SECS", default_value_t = 60)]
    pub misfire_grace_secs: u64,

    /// wait | abandon
    #[arg(long, env = "BATCHFLOW_SHUTDOWN_MODE", default_value = "wait")]
    pub shutdown_mode: String,

    /// JSON workflow definitions imported at startup
    #[arg(long, env = "BATCHFLOW_WORKFLOWS_FILE")]
    pub workflows_file: Option<String>,

    #[command(flatten)]
    pub log: LogArgs,
}

/// Validated settings for `serve`
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: PathBuf,
    pub scheduler: SchedulerConfig,
    pub shutdown_mode: ShutdownMode,
    pub workflows_file: Option<PathBuf>,
}

impl DaemonConfig {
    pub fn from_args(args: &ServeArgs) -> Result<Self> {
        let timezone = parse_timezone(&args.timezone)
            .with_context(|| format!("invalid BATCHFLOW_TIMEZONE '{}'", args.timezone))?;

        let scheduler = SchedulerConfig {
            max_threads: args.max_threads,
            max_processes: args.max_processes,
            max_instances: args.max_instances,
            misfire_grace: Duration::from_secs(args.misfire_grace_secs),
            timezone,
            ..SchedulerConfig::default()
        };
        scheduler.validate()?;

        Ok(Self {
            db_path: expand_path(&args.db_path),
            scheduler,
            shutdown_mode: args.shutdown_mode.parse()?,
            workflows_file: args.workflows_file.as_deref().map(expand_path),
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}", self.db_path.display())
    }
}

pub fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        serve: ServeArgs,
    }

    fn parse(args: &[&str]) -> ServeArgs {
        TestCli::parse_from(std::iter::once("batchflow").chain(args.iter().copied())).serve
    }

    #[test]
    fn test_defaults_match_scheduler_defaults() {
        let config = DaemonConfig::from_args(&parse(&["--db-path", "/tmp/jobs.db"])).unwrap();

        assert_eq!(config.scheduler, SchedulerConfig::default());
        assert_eq!(config.shutdown_mode, ShutdownMode::Wait);
        assert_eq!(config.database_url(), "sqlite:///tmp/jobs.db");
        assert!(config.workflows_file.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = DaemonConfig::from_args(&parse(&[
            "--db-path",
            "/tmp/jobs.db",
            "--max-threads",
            "4",
            "--timezone",
            "Europe/Berlin",
            "--shutdown-mode",
            "abandon",
        ]))
        .unwrap();

        assert_eq!(config.scheduler.max_threads, 4);
        assert_eq!(
            config.scheduler.timezone,
            parse_timezone("Europe/Berlin").unwrap()
        );
        assert_eq!(config.shutdown_mode, ShutdownMode::Abandon);
    }

    #[test]
    fn test_rejects_bad_values() {
        tokio_test::assert_err!(DaemonConfig::from_args(&parse(&["--timezone", "Mars/Olympus"])));
        tokio_test::assert_err!(DaemonConfig::from_args(&parse(&["--max-processes", "0"])));
        tokio_test::assert_err!(DaemonConfig::from_args(&parse(&["--shutdown-mode", "later"])));
    }
}
