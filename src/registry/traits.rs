//! Registry traits and error types
//!
//! This module defines the locking capability the registry store is built
//! with and the errors registry operations can produce.

use crate::registry::lock::lock_path_for;
use crate::registry::LockGuard;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur during registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Registry not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Invalid registry schema at {}: {message}", .path.display())]
    SchemaInvalid { path: PathBuf, message: String },

    #[error("Timed out after {waited:?} waiting for registry lock {}", .path.display())]
    LockTimeout { path: PathBuf, waited: Duration },

    #[error("Item '{0}' is not in the registry; run a sync first")]
    ItemNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Cross-process mutual exclusion over one collection's registry
///
/// The store is constructed with exactly one implementation, so whether
/// updates are serialized is visible from the store itself.
pub trait Locker: Send + Sync + fmt::Debug {
    /// Makes one non-blocking attempt; `Ok(None)` means another holder has it
    fn try_acquire(&self, registry: &Path) -> RegistryResult<Option<LockGuard>>;

    /// How long a waiter polls before giving up with `LockTimeout`
    fn timeout(&self) -> Duration;

    fn poll_interval(&self) -> Duration;

    /// Returns true if this locker actually serializes access
    fn is_serializing(&self) -> bool;

    /// Blocks the current thread until the lock guarding `registry` is held,
    /// or the locker's timeout elapses
    ///
    /// Async callers use [`crate::registry::RegistryStore::acquire_async`].
    fn acquire(&self, registry: &Path) -> RegistryResult<LockGuard> {
        let started = Instant::now();
        loop {
            if let Some(guard) = self.try_acquire(registry)? {
                return Ok(guard);
            }
            std::thread::sleep(next_poll(self, registry, started)?);
        }
    }
}

/// Delay before the next poll, or `LockTimeout` once the locker's timeout
/// has elapsed since `started`
pub(crate) fn next_poll<L: Locker + ?Sized>(
    locker: &L,
    registry: &Path,
    started: Instant,
) -> RegistryResult<Duration> {
    let waited = started.elapsed();
    let timeout = locker.timeout();
    if waited >= timeout {
        return Err(RegistryError::LockTimeout {
            path: lock_path_for(registry),
            waited,
        });
    }
    Ok(locker.poll_interval().min(timeout - waited))
}
