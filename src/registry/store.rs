//! JSON registry store
//!
//! One `antenna.json` per collection directory. Writes go through
//! [`atomic_write`]: temp file, `sync_all`, rename, directory sync. A reader
//! only ever sees the previous complete image or the next one.

use crate::config::RegistryConfig;
use crate::registry::lock::{FileLocker, LockGuard, NoopLocker};
use crate::registry::merge::{merge_discovered, MergeOptions, MergeReport};
use crate::registry::traits::{next_poll, Locker, RegistryError, RegistryResult};
use crate::registry::{CollectionHeader, ItemDescriptor, Registry, REGISTRY_FILENAME};
use chrono::Utc;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Returns the path of the registry file for a collection directory
pub fn registry_path(collection_dir: &Path) -> PathBuf {
    collection_dir.join(REGISTRY_FILENAME)
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Writes `bytes` to `target` so that `target` is never observed half-written
pub(crate) fn atomic_write(target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    let temp = temp_path_for(target);
    let written = (|| {
        let mut file = File::create(&temp)?;
        file.write_all(bytes)?;
        file.sync_all()
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp);
        return Err(e);
    }

    fs::rename(&temp, target)?;
    sync_parent_dir(target);
    Ok(())
}

#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    if let Some(parent) = target.parent() {
        if let Err(e) = File::open(parent).and_then(|dir| dir.sync_all()) {
            tracing::debug!(error = %e, dir = %parent.display(), "Directory sync failed");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}

/// Finds every collection directory under `root` that contains a registry
pub fn list_collections(root: &Path) -> RegistryResult<Vec<PathBuf>> {
    let mut found = Vec::new();
    if !root.is_dir() {
        return Ok(found);
    }

    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        if registry_path(&dir).is_file() {
            found.push(dir.clone());
        }
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                stack.push(entry.path());
            }
        }
    }

    found.sort();
    Ok(found)
}

/// Durable store for collection registries
///
/// The store is built with one [`Locker`]; [`RegistryStore::update`] holds
/// that lock across the whole load-modify-save cycle.
#[derive(Debug)]
pub struct RegistryStore {
    locker: Box<dyn Locker>,
}

impl RegistryStore {
    pub fn new(locker: Box<dyn Locker>) -> Self {
        Self { locker }
    }

    /// A store that does not serialize writers across processes
    pub fn unlocked() -> Self {
        Self::new(Box::new(NoopLocker))
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        if config.lock {
            Self::new(Box::new(FileLocker::new(config.lock_timeout())))
        } else {
            tracing::warn!("Registry locking disabled; concurrent runs may lose updates");
            Self::unlocked()
        }
    }

    /// Returns true if updates are serialized across processes
    pub fn is_serializing(&self) -> bool {
        self.locker.is_serializing()
    }

    pub fn exists(&self, collection_dir: &Path) -> bool {
        registry_path(collection_dir).is_file()
    }

    /// Loads and validates the registry of a collection
    ///
    /// # Returns
    ///
    /// * `Err(RegistryError::NotFound)` - No registry exists in `collection_dir`
    /// * `Err(RegistryError::SchemaInvalid)` - The file does not parse into a
    ///   registry or violates its invariants
    pub fn load(&self, collection_dir: &Path) -> RegistryResult<Registry> {
        let path = registry_path(collection_dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RegistryError::NotFound(path));
            }
            Err(e) => return Err(RegistryError::Io(e)),
        };

        let registry: Registry =
            serde_json::from_str(&content).map_err(|e| RegistryError::SchemaInvalid {
                path: path.clone(),
                message: e.to_string(),
            })?;

        registry
            .check_invariants()
            .map_err(|message| RegistryError::SchemaInvalid { path, message })?;

        Ok(registry)
    }

    /// Writes the full registry image atomically
    ///
    /// Does not take the lock; read-modify-write callers go through
    /// [`RegistryStore::update`] or hold [`RegistryStore::acquire`] themselves.
    pub fn save(&self, collection_dir: &Path, registry: &Registry) -> RegistryResult<()> {
        let path = registry_path(collection_dir);
        let mut json = serde_json::to_string_pretty(registry)?;
        json.push('\n');
        atomic_write(&path, json.as_bytes())?;
        tracing::trace!(path = %path.display(), items = registry.len(), "Saved registry");
        Ok(())
    }

    /// Acquires the collection's lock for a caller-managed critical section
    ///
    /// Blocks the calling thread while waiting; inside a runtime use
    /// [`RegistryStore::acquire_async`].
    pub fn acquire(&self, collection_dir: &Path) -> RegistryResult<LockGuard> {
        self.locker.acquire(&registry_path(collection_dir))
    }

    /// Like [`RegistryStore::acquire`], but yields to the runtime between polls
    pub async fn acquire_async(&self, collection_dir: &Path) -> RegistryResult<LockGuard> {
        let path = registry_path(collection_dir);
        let started = Instant::now();
        loop {
            if let Some(guard) = self.locker.try_acquire(&path)? {
                return Ok(guard);
            }
            let delay = next_poll(self.locker.as_ref(), &path, started)?;
            tokio::time::sleep(delay).await;
        }
    }

    /// Creates a registry for a collection, or returns the existing one untouched
    pub fn init<I>(
        &self,
        collection_dir: &Path,
        header: CollectionHeader,
        initial_items: I,
    ) -> RegistryResult<Registry>
    where
        I: IntoIterator<Item = ItemDescriptor>,
    {
        let _guard = self.acquire(collection_dir)?;
        self.init_locked(collection_dir, header, initial_items)
    }

    pub async fn init_async<I>(
        &self,
        collection_dir: &Path,
        header: CollectionHeader,
        initial_items: I,
    ) -> RegistryResult<Registry>
    where
        I: IntoIterator<Item = ItemDescriptor>,
    {
        let _guard = self.acquire_async(collection_dir).await?;
        self.init_locked(collection_dir, header, initial_items)
    }

    fn init_locked<I>(
        &self,
        collection_dir: &Path,
        header: CollectionHeader,
        initial_items: I,
    ) -> RegistryResult<Registry>
    where
        I: IntoIterator<Item = ItemDescriptor>,
    {
        if self.exists(collection_dir) {
            tracing::debug!(dir = %collection_dir.display(), "Registry already exists");
            return self.load(collection_dir);
        }

        let mut registry = Registry::new(header);
        registry.header.last_synced = Some(Utc::now());
        merge_discovered(&mut registry, initial_items, MergeOptions::bulk_init());

        self.save(collection_dir, &registry)?;
        tracing::info!(
            collection = %registry.header.collection_id,
            items = registry.len(),
            "Created registry"
        );
        Ok(registry)
    }

    /// Runs `mutate` against the stored registry under the collection lock
    ///
    /// The registry is saved only if `mutate` succeeds; on error the stored
    /// image is left as it was.
    pub fn update<T, F>(&self, collection_dir: &Path, mutate: F) -> RegistryResult<(Registry, T)>
    where
        F: FnOnce(&mut Registry) -> RegistryResult<T>,
    {
        let _guard = self.acquire(collection_dir)?;
        self.update_locked(collection_dir, mutate)
    }

    /// [`RegistryStore::update`] for async callers
    pub async fn update_async<T, F>(
        &self,
        collection_dir: &Path,
        mutate: F,
    ) -> RegistryResult<(Registry, T)>
    where
        F: FnOnce(&mut Registry) -> RegistryResult<T>,
    {
        let _guard = self.acquire_async(collection_dir).await?;
        self.update_locked(collection_dir, mutate)
    }

    fn update_locked<T, F>(&self, collection_dir: &Path, mutate: F) -> RegistryResult<(Registry, T)>
    where
        F: FnOnce(&mut Registry) -> RegistryResult<T>,
    {
        let mut registry = self.load(collection_dir)?;
        let value = mutate(&mut registry)?;
        self.save(collection_dir, &registry)?;
        Ok((registry, value))
    }

    /// Merges freshly discovered items into the stored registry
    pub fn sync<I>(
        &self,
        collection_dir: &Path,
        discovered: I,
        options: MergeOptions,
    ) -> RegistryResult<(Registry, MergeReport)>
    where
        I: IntoIterator<Item = ItemDescriptor>,
    {
        let (registry, report) = self.update(collection_dir, |registry| {
            Ok(merge_discovered(registry, discovered, options))
        })?;

        tracing::info!(
            inserted = report.inserted,
            refreshed = report.refreshed,
            skipped = report.skipped,
            "Synced registry"
        );
        Ok((registry, report))
    }
}
