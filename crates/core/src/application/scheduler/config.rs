// Scheduler configuration
use crate::application::constants::{
    DEFAULT_MAX_INSTANCES, DEFAULT_MAX_PROCESSES, DEFAULT_MAX_THREADS, DEFAULT_MISFIRE_GRACE,
    DISPATCH_TICK_INTERVAL,
};
use crate::error::{AppError, Result};
use chrono_tz::Tz;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Capacity of the thread-backed pool
    pub max_threads: usize,
    /// Capacity of the process-backed pool
    pub max_processes: usize,
    pub tick_interval: Duration,
    /// Fires later than this are dropped and reported as missed
    pub misfire_grace: Duration,
    /// Concurrent runs allowed per binding
    pub max_instances: usize,
    /// Zone for cron matching and naive date timestamps
    pub timezone: Tz,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_threads: DEFAULT_MAX_THREADS,
            max_processes: DEFAULT_MAX_PROCESSES,
            tick_interval: DISPATCH_TICK_INTERVAL,
            misfire_grace: DEFAULT_MISFIRE_GRACE,
            max_instances: DEFAULT_MAX_INSTANCES,
            timezone: Tz::UTC,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_threads == 0 || self.max_processes == 0 {
            return Err(AppError::Config(
                "pool sizes must be greater than 0".to_string(),
            ));
        }
        if self.max_instances == 0 {
            return Err(AppError::Config(
                "max_instances must be greater than 0".to_string(),
            ));
        }
        if self.tick_interval.is_zero() {
            return Err(AppError::Config(
                "tick interval must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub(crate) fn misfire_grace_millis(&self) -> i64 {
        i64::try_from(self.misfire_grace.as_millis()).unwrap_or(i64::MAX)
    }
}

/// What `shutdown` does with runs still in flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Stop runs after their current task and wait for them
    #[default]
    Wait,
    /// Return immediately, leaving runs detached
    Abandon,
}

impl FromStr for ShutdownMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wait" => Ok(ShutdownMode::Wait),
            "abandon" => Ok(ShutdownMode::Abandon),
            other => Err(AppError::Config(format!(
                "unknown shutdown mode '{}' (expected wait|abandon)",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.max_threads, 10);
        assert_eq!(config.max_processes, 5);
        assert_eq!(config.max_instances, 3);
        assert_eq!(config.misfire_grace_millis(), 60_000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_pool_rejected() {
        let config = SchedulerConfig {
            max_processes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_shutdown_mode_parse() {
        assert_eq!("WAIT".parse::<ShutdownMode>().unwrap(), ShutdownMode::Wait);
        assert_eq!(
            "abandon".parse::<ShutdownMode>().unwrap(),
            ShutdownMode::Abandon
        );
        assert!("kill".parse::<ShutdownMode>().is_err());
    }
}
