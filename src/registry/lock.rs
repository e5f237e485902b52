//! Advisory file locking for registry updates
//!
//! The lock file lives next to the registry (`antenna.json.lock`) and is never
//! deleted; removing it while another process waits on it would let two
//! writers hold "the" lock on different inodes.

use crate::registry::traits::{Locker, RegistryError, RegistryResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A held registry lock, released on drop
#[derive(Debug)]
pub struct LockGuard {
    file: Option<File>,
    path: Option<PathBuf>,
}

impl LockGuard {
    /// A guard that holds nothing, handed out by [`NoopLocker`]
    pub fn noop() -> Self {
        Self {
            file: None,
            path: None,
        }
    }

    /// Returns true if an OS lock is actually held
    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(e) = FileExt::unlock(&file) {
                tracing::warn!(error = %e, "Failed to release registry lock");
            }
        }
    }
}

/// Exclusive advisory lock on `<registry>.lock`, polled until a timeout
#[derive(Debug, Clone)]
pub struct FileLocker {
    timeout: Duration,
    poll_interval: Duration,
}

impl FileLocker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            poll_interval: Duration::from_millis(50),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Path of the lock file guarding `registry`
pub(crate) fn lock_path_for(registry: &Path) -> PathBuf {
    let mut name = registry.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

impl Locker for FileLocker {
    fn try_acquire(&self, registry: &Path) -> RegistryResult<Option<LockGuard>> {
        let lock_path = lock_path_for(registry);
        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                tracing::trace!(path = %lock_path.display(), "Acquired registry lock");
                Ok(Some(LockGuard {
                    file: Some(file),
                    path: Some(lock_path),
                }))
            }
            Err(e) if is_contended(&e) => Ok(None),
            Err(e) => Err(RegistryError::Io(e)),
        }
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    fn is_serializing(&self) -> bool {
        true
    }
}

fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

/// Performs no serialization; concurrent writers may lose updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopLocker;

impl Locker for NoopLocker {
    fn try_acquire(&self, _registry: &Path) -> RegistryResult<Option<LockGuard>> {
        Ok(Some(LockGuard::noop()))
    }

    fn timeout(&self) -> Duration {
        Duration::ZERO
    }

    fn poll_interval(&self) -> Duration {
        Duration::ZERO
    }

    fn is_serializing(&self) -> bool {
        false
    }
}
