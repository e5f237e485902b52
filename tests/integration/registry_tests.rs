//! Registry persistence under concurrent writers

use antenna::registry::{
    apply_status, merge_discovered, CollectionHeader, FileLocker, ItemDescriptor, MergeOptions,
    RegistryError, RegistryStore, StatusUpdate,
};
use chrono::Utc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

fn locked_store(timeout: Duration) -> RegistryStore {
    RegistryStore::new(Box::new(FileLocker::new(timeout)))
}

#[test]
fn test_concurrent_updates_are_all_kept() {
    let dir = tempdir().unwrap();
    let ids: Vec<String> = (0..8).map(|i| format!("v{}", i)).collect();

    let store = locked_store(Duration::from_secs(10));
    store
        .init(
            dir.path(),
            CollectionHeader::new("UC1"),
            ids.iter().map(ItemDescriptor::new),
        )
        .unwrap();

    let dir = Arc::new(dir.path().to_path_buf());
    let handles: Vec<_> = ids
        .iter()
        .cloned()
        .map(|id| {
            let dir = Arc::clone(&dir);
            thread::spawn(move || {
                let store = locked_store(Duration::from_secs(10));
                store
                    .update(&dir, |registry| {
                        apply_status(registry, &id, StatusUpdate::new().metadata_fetched(), Utc::now())
                    })
                    .unwrap();
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let registry = store.load(&dir).unwrap();
    assert_eq!(registry.len(), 8);
    assert!(registry.items.values().all(|e| e.status.metadata_fetched));
}

#[test]
fn test_held_lock_times_out() {
    let dir = tempdir().unwrap();
    let holder = locked_store(Duration::from_secs(1));
    holder
        .init(dir.path(), CollectionHeader::new("UC1"), Vec::new())
        .unwrap();
    let guard = holder.acquire(dir.path()).unwrap();
    assert!(guard.is_held());

    let waiter = locked_store(Duration::from_millis(150));
    let result = waiter.update(dir.path(), |registry| {
        Ok(merge_discovered(registry, vec![ItemDescriptor::new("v1")], MergeOptions::sync()))
    });
    assert!(matches!(result, Err(RegistryError::LockTimeout { .. })));

    // Nothing was written while the lock was held
    assert!(waiter.load(dir.path()).unwrap().is_empty());

    drop(guard);
    let (registry, report) = waiter
        .sync(dir.path(), vec![ItemDescriptor::new("v1")], MergeOptions::sync())
        .unwrap();
    assert_eq!(report.inserted, 1);
    assert_eq!(registry.len(), 1);
}
