// Platform file probe
// Unix: non-blocking exclusive flock (advisory; producers must lock while writing)
// Windows: exclusive open, ERROR_SHARING_VIOLATION means another process has it
use std::fs::File;
use std::io;
use std::path::Path;
use tracing::trace;

use batchflow_core::port::readiness::{FileCheckError, FileProbe, FileStatus};

#[cfg(windows)]
const ERROR_SHARING_VIOLATION: i32 = 32;

/// Lock detection for the current platform
#[derive(Debug, Default, Clone, Copy)]
pub struct PlatformFileProbe;

impl PlatformFileProbe {
    pub fn new() -> Self {
        Self
    }
}

fn modified(file: &File) -> Option<std::time::SystemTime> {
    file.metadata().and_then(|m| m.modified()).ok()
}

impl FileProbe for PlatformFileProbe {
    #[cfg(unix)]
    fn probe(&self, path: &Path) -> Result<FileStatus, FileCheckError> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(FileStatus::Missing),
            Err(e) => return Err(FileCheckError::new(path, e)),
        };
        let modified = modified(&file);

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            // Dropping the guard releases the lock again
            Ok(_guard) => Ok(FileStatus::Available { modified }),
            Err((_, errno)) if errno == Errno::EWOULDBLOCK => {
                trace!(path = %path.display(), "File is locked");
                Ok(FileStatus::Locked)
            }
            Err((_, errno)) => Err(FileCheckError::new(path, io::Error::from(errno))),
        }
    }

    #[cfg(windows)]
    fn probe(&self, path: &Path) -> Result<FileStatus, FileCheckError> {
        use std::fs::OpenOptions;
        use std::os::windows::fs::OpenOptionsExt;

        match OpenOptions::new().read(true).share_mode(0).open(path) {
            Ok(file) => Ok(FileStatus::Available {
                modified: modified(&file),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileStatus::Missing),
            Err(e) if e.raw_os_error() == Some(ERROR_SHARING_VIOLATION) => {
                trace!(path = %path.display(), "File is locked");
                Ok(FileStatus::Locked)
            }
            Err(e) => Err(FileCheckError::new(path, e)),
        }
    }

    #[cfg(not(any(unix, windows)))]
    fn probe(&self, path: &Path) -> Result<FileStatus, FileCheckError> {
        match File::open(path) {
            Ok(file) => Ok(FileStatus::Available {
                modified: modified(&file),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(FileStatus::Missing),
            Err(e) => Err(FileCheckError::new(path, e)),
        }
    }
}
