// File Readiness Ports
// FileProbe: one platform-specific look at a path
// FileReadinessMonitor: bounded wait until a path is usable

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use thiserror::Error;

/// What a single probe observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Missing,
    /// Exists but another process holds an exclusive lock
    Locked,
    Available { modified: Option<SystemTime> },
}

/// Probing failed for a reason other than missing/locked
#[derive(Error, Debug)]
#[error("file check failed for {}: {source}", path.display())]
pub struct FileCheckError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

impl FileCheckError {
    pub fn new(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Platform lock-detection capability
pub trait FileProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<FileStatus, FileCheckError>;
}

/// Outcome of a bounded readiness wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    /// Appeared but was still locked at the deadline
    LockedTimedOut,
    /// Never appeared
    MissingTimedOut,
    /// Available but older than the freshness bound at the deadline
    StaleTimedOut,
}

#[async_trait]
pub trait FileReadinessMonitor: Send + Sync {
    /// Wait until `path` exists, is unlocked and (if `not_before` is set)
    /// was modified no earlier than `not_before`, or until `timeout` elapses
    async fn await_ready(
        &self,
        path: &Path,
        timeout: Duration,
        not_before: Option<SystemTime>,
    ) -> Result<Readiness, FileCheckError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    /// Probe returning scripted statuses per path
    ///
    /// Behaves like the response queues of the scripted runner: the last
    /// status repeats; unknown paths are `Missing`.
    #[derive(Default)]
    pub struct ScriptedFileProbe {
        statuses: Mutex<HashMap<PathBuf, VecDeque<FileStatus>>>,
        failing: Mutex<HashMap<PathBuf, std::io::ErrorKind>>,
    }

    impl ScriptedFileProbe {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn script(
            self,
            path: impl Into<PathBuf>,
            statuses: impl IntoIterator<Item = FileStatus>,
        ) -> Self {
            self.statuses
                .lock()
                .unwrap()
                .entry(path.into())
                .or_default()
                .extend(statuses);
            self
        }

        /// Make every probe of `path` fail with an I/O error
        pub fn fail_with(self, path: impl Into<PathBuf>, kind: std::io::ErrorKind) -> Self {
            self.failing.lock().unwrap().insert(path.into(), kind);
            self
        }

        /// Replace the scripted statuses of `path` from now on
        pub fn set(&self, path: impl Into<PathBuf>, status: FileStatus) {
            self.statuses
                .lock()
                .unwrap()
                .insert(path.into(), VecDeque::from([status]));
        }
    }

    impl FileProbe for ScriptedFileProbe {
        fn probe(&self, path: &Path) -> Result<FileStatus, FileCheckError> {
            if let Some(kind) = self.failing.lock().unwrap().get(path) {
                return Err(FileCheckError::new(path, std::io::Error::from(*kind)));
            }
            let mut statuses = self.statuses.lock().unwrap();
            let status = match statuses.get_mut(path) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().copied(),
                None => None,
            };
            Ok(status.unwrap_or(FileStatus::Missing))
        }
    }
}
