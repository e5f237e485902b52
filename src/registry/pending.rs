//! Pending-work selection over a loaded registry
//!
//! Pure functions of the registry snapshot: nothing here reads the store or
//! takes the lock.

use crate::registry::{ItemEntry, Registry};
use crate::state::Stage;
use std::cmp::Ordering;

fn publication_cmp(a: &ItemEntry, b: &ItemEntry) -> Ordering {
    a.published_at
        .cmp(&b.published_at)
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.item_id.cmp(&b.item_id))
}

/// Returns every entry, oldest first
///
/// Ties on `published_at` are broken by title, then by `item_id`, so the
/// order is stable across runs.
pub fn publication_order(registry: &Registry) -> Vec<&ItemEntry> {
    let mut all: Vec<&ItemEntry> = registry.items.values().collect();
    all.sort_by(|a, b| publication_cmp(a, b));
    all
}

/// Returns the entries that still need `stage`, in publication order
pub fn pending(registry: &Registry, stage: Stage) -> Vec<&ItemEntry> {
    let mut selected: Vec<&ItemEntry> = registry
        .items
        .values()
        .filter(|entry| entry.status.needs(stage))
        .collect();
    selected.sort_by(|a, b| publication_cmp(a, b));
    selected
}
