// Polling readiness monitor
use crate::application::constants::{FILE_POLL_INTERVAL, FRESHNESS_TOLERANCE};
use crate::port::{FileCheckError, FileProbe, FileReadinessMonitor, FileStatus, Readiness};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::time::{sleep, Instant};
use tracing::debug;

/// Probes a path at a fixed interval until it is usable or the wait times out
///
/// Any I/O error from the probe ends the wait immediately.
pub struct PollingReadinessMonitor {
    probe: Arc<dyn FileProbe>,
    poll_interval: Duration,
}

impl PollingReadinessMonitor {
    pub fn new(probe: Arc<dyn FileProbe>) -> Self {
        Self::with_poll_interval(probe, FILE_POLL_INTERVAL)
    }

    pub fn with_poll_interval(probe: Arc<dyn FileProbe>, poll_interval: Duration) -> Self {
        Self {
            probe,
            poll_interval,
        }
    }

    /// Probes open and lock the file, so they run on the blocking pool
    async fn probe_once(&self, path: &Path) -> Result<FileStatus, FileCheckError> {
        let probe = Arc::clone(&self.probe);
        let owned = path.to_path_buf();
        tokio::task::spawn_blocking(move || probe.probe(&owned))
            .await
            .map_err(|e| FileCheckError::new(path, std::io::Error::other(e)))?
    }
}

fn is_fresh(modified: Option<SystemTime>, not_before: Option<SystemTime>) -> bool {
    match (modified, not_before) {
        (Some(modified), Some(bound)) => {
            let bound = bound.checked_sub(FRESHNESS_TOLERANCE).unwrap_or(bound);
            modified >= bound
        }
        // No bound, or the platform reports no mtime
        _ => true,
    }
}

#[async_trait]
impl FileReadinessMonitor for PollingReadinessMonitor {
    async fn await_ready(
        &self,
        path: &Path,
        timeout: Duration,
        not_before: Option<SystemTime>,
    ) -> Result<Readiness, FileCheckError> {
        let deadline = Instant::now() + timeout;

        let last = loop {
            let status = self.probe_once(path).await?;
            if let FileStatus::Available { modified } = status {
                if is_fresh(modified, not_before) {
                    return Ok(Readiness::Ready);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break status;
            }
            debug!(path = %path.display(), status = ?status, "Output not ready yet");
            sleep(self.poll_interval.min(deadline - now)).await;
        };

        Ok(match last {
            FileStatus::Missing => Readiness::MissingTimedOut,
            FileStatus::Locked => Readiness::LockedTimedOut,
            FileStatus::Available { .. } => Readiness::StaleTimedOut,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::readiness::mocks::ScriptedFileProbe;
    use std::path::PathBuf;

    fn monitor(probe: ScriptedFileProbe) -> PollingReadinessMonitor {
        PollingReadinessMonitor::new(Arc::new(probe))
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_times_out_as_missing() {
        let m = monitor(ScriptedFileProbe::new());
        let started = Instant::now();

        let readiness = m
            .await_ready(Path::new("/tmp/out.csv"), Duration::from_secs(60), None)
            .await
            .unwrap();

        assert_eq!(readiness, Readiness::MissingTimedOut);
        assert!(started.elapsed() >= Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_locked_then_released() {
        let path = PathBuf::from("/data/export.xlsx");
        let probe = ScriptedFileProbe::new().script(
            &path,
            [
                FileStatus::Missing,
                FileStatus::Locked,
                FileStatus::Locked,
                FileStatus::Available { modified: None },
            ],
        );

        let readiness = monitor(probe)
            .await_ready(&path, Duration::from_secs(10), None)
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::Ready);
    }

    #[tokio::test(start_paused = true)]
    async fn test_still_locked_at_deadline() {
        let path = PathBuf::from("/data/report.pdf");
        let probe = ScriptedFileProbe::new().script(&path, [FileStatus::Missing, FileStatus::Locked]);

        let readiness = monitor(probe)
            .await_ready(&path, Duration::from_secs(5), None)
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::LockedTimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_file_never_counts_as_ready() {
        let path = PathBuf::from("/data/daily.csv");
        let yesterday = SystemTime::now() - Duration::from_secs(86_400);
        let probe = ScriptedFileProbe::new().script(
            &path,
            [FileStatus::Available {
                modified: Some(yesterday),
            }],
        );
        let m = monitor(probe);

        let fresh_bound = Some(SystemTime::now());
        assert_eq!(
            m.await_ready(&path, Duration::from_secs(3), fresh_bound)
                .await
                .unwrap(),
            Readiness::StaleTimedOut
        );
        // Without a bound the same file is ready
        assert_eq!(
            m.await_ready(&path, Duration::from_secs(3), None).await.unwrap(),
            Readiness::Ready
        );
    }

    #[tokio::test]
    async fn test_probe_error_propagates() {
        let path = PathBuf::from("/restricted/out.bin");
        let probe =
            ScriptedFileProbe::new().fail_with(&path, std::io::ErrorKind::PermissionDenied);

        let err = monitor(probe)
            .await_ready(&path, Duration::from_secs(60), None)
            .await
            .unwrap_err();
        assert_eq!(err.path, path);
        assert_eq!(err.source.kind(), std::io::ErrorKind::PermissionDenied);
    }

    /// Blocks inside `probe` until the test hands it a status
    struct HandoffProbe {
        handoff: std::sync::Mutex<std::sync::mpsc::Receiver<FileStatus>>,
    }

    impl FileProbe for HandoffProbe {
        fn probe(&self, path: &Path) -> Result<FileStatus, FileCheckError> {
            self.handoff
                .lock()
                .unwrap()
                .recv()
                .map_err(|e| FileCheckError::new(path, std::io::Error::other(e)))
        }
    }

    #[tokio::test]
    async fn test_blocking_probe_does_not_stall_the_runtime() {
        // Single-threaded runtime: a probe on the async worker would block
        // the task that unblocks it
        let (tx, rx) = std::sync::mpsc::channel();
        let m = PollingReadinessMonitor::new(Arc::new(HandoffProbe {
            handoff: std::sync::Mutex::new(rx),
        }));

        let (readiness, ()) = tokio::join!(
            m.await_ready(Path::new("/data/fifo"), Duration::from_secs(5), None),
            async move {
                tokio::task::yield_now().await;
                tx.send(FileStatus::Available { modified: None }).unwrap();
            }
        );

        assert_eq!(readiness.unwrap(), Readiness::Ready);
    }

    #[tokio::test]
    async fn test_zero_timeout_probes_once() {
        let path = PathBuf::from("/data/ready.flag");
        let probe =
            ScriptedFileProbe::new().script(&path, [FileStatus::Available { modified: None }]);

        let readiness = monitor(probe)
            .await_ready(&path, Duration::ZERO, None)
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::Ready);
    }
}
