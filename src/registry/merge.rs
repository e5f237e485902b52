//! Reconciling discovered items and stage results with a registry
//!
//! Merging never lowers a status flag and never touches provenance or local
//! paths of an existing entry. [`apply_status`] is the only write path for
//! stage results.

use crate::registry::traits::{RegistryError, RegistryResult};
use crate::registry::{ItemDescriptor, ItemEntry, Registry};
use crate::state::{ItemStatus, TranscriptSource};
use chrono::{DateTime, Utc};

/// Controls how [`merge_discovered`] treats the incoming descriptors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Set `last_synced` when at least one item is inserted
    pub touch_last_synced: bool,
    /// Honour a descriptor's pre-set status for newly inserted items
    pub keep_incoming_status: bool,
}

impl MergeOptions {
    /// Options for a regular discovery sync
    pub fn sync() -> Self {
        Self {
            touch_last_synced: true,
            keep_incoming_status: false,
        }
    }

    /// Options for seeding a new registry from an existing inventory
    pub fn bulk_init() -> Self {
        Self {
            touch_last_synced: false,
            keep_incoming_status: true,
        }
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::sync()
    }
}

/// Counts of what a merge did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub inserted: usize,
    pub refreshed: usize,
    pub skipped: usize,
}

impl MergeReport {
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.refreshed > 0
    }
}

/// Merges `discovered` into `registry` using the current time
pub fn merge_discovered<I>(registry: &mut Registry, discovered: I, options: MergeOptions) -> MergeReport
where
    I: IntoIterator<Item = ItemDescriptor>,
{
    merge_discovered_at(registry, discovered, options, Utc::now())
}

/// Merges `discovered` into `registry` as of `now`
pub fn merge_discovered_at<I>(
    registry: &mut Registry,
    discovered: I,
    options: MergeOptions,
    now: DateTime<Utc>,
) -> MergeReport
where
    I: IntoIterator<Item = ItemDescriptor>,
{
    let mut report = MergeReport::default();

    for descriptor in discovered {
        let item_id = descriptor.item_id.trim().to_string();
        if item_id.is_empty() {
            tracing::debug!("Skipping discovered item without an id");
            report.skipped += 1;
            continue;
        }

        match registry.items.get_mut(&item_id) {
            Some(entry) => {
                if refresh_metadata(entry, descriptor) {
                    entry.last_updated = Some(now);
                    report.refreshed += 1;
                }
            }
            None => {
                let entry = new_entry(item_id.clone(), descriptor, options, now);
                tracing::debug!(item_id = %item_id, "Discovered new item");
                registry.items.insert(item_id, entry);
                report.inserted += 1;
            }
        }
    }

    if options.touch_last_synced && report.inserted > 0 {
        registry.header.last_synced = Some(now);
    }

    report
}

fn new_entry(
    item_id: String,
    descriptor: ItemDescriptor,
    options: MergeOptions,
    now: DateTime<Utc>,
) -> ItemEntry {
    let status = if options.keep_incoming_status {
        descriptor.status.unwrap_or_default()
    } else {
        ItemStatus::default()
    };

    ItemEntry {
        item_id,
        title: descriptor.title.unwrap_or_default(),
        published_at: descriptor.published_at.unwrap_or(now),
        duration_sec: descriptor.duration_sec,
        view_count: descriptor.view_count,
        like_count: descriptor.like_count,
        comment_count: descriptor.comment_count,
        tags: descriptor.tags,
        category: descriptor.category,
        url: descriptor.url,
        source: None,
        language: None,
        path_rendered: None,
        path_raw: None,
        status,
        last_updated: Some(now),
    }
}

/// Overwrites descriptive fields where the incoming value is present
///
/// Returns true if any field changed.
fn refresh_metadata(entry: &mut ItemEntry, incoming: ItemDescriptor) -> bool {
    fn set<T: PartialEq>(slot: &mut T, value: T) -> bool {
        if *slot == value {
            false
        } else {
            *slot = value;
            true
        }
    }

    let mut changed = false;
    if let Some(title) = incoming.title {
        changed |= set(&mut entry.title, title);
    }
    if let Some(published_at) = incoming.published_at {
        changed |= set(&mut entry.published_at, published_at);
    }
    if incoming.duration_sec.is_some() {
        changed |= set(&mut entry.duration_sec, incoming.duration_sec);
    }
    if incoming.view_count.is_some() {
        changed |= set(&mut entry.view_count, incoming.view_count);
    }
    if incoming.like_count.is_some() {
        changed |= set(&mut entry.like_count, incoming.like_count);
    }
    if incoming.comment_count.is_some() {
        changed |= set(&mut entry.comment_count, incoming.comment_count);
    }
    if incoming.tags.is_some() {
        changed |= set(&mut entry.tags, incoming.tags);
    }
    if incoming.category.is_some() {
        changed |= set(&mut entry.category, incoming.category);
    }
    if incoming.url.is_some() {
        changed |= set(&mut entry.url, incoming.url);
    }
    changed
}

/// A set of stage results to record for one item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    pub metadata_fetched: Option<bool>,
    pub transcript_downloaded: Option<bool>,
    pub markdown_generated: Option<bool>,
    pub summarized: Option<bool>,
    pub source: Option<TranscriptSource>,
    pub language: Option<String>,
    pub path_rendered: Option<String>,
    pub path_raw: Option<String>,
    force: bool,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata_fetched(mut self) -> Self {
        self.metadata_fetched = Some(true);
        self
    }

    /// Records a downloaded transcript with its provenance and raw payload path
    pub fn downloaded(
        mut self,
        source: TranscriptSource,
        language: impl Into<String>,
        path_raw: impl Into<String>,
    ) -> Self {
        self.transcript_downloaded = Some(true);
        self.source = Some(source);
        self.language = Some(language.into());
        self.path_raw = Some(path_raw.into());
        self
    }

    pub fn rendered(mut self, path_rendered: impl Into<String>) -> Self {
        self.markdown_generated = Some(true);
        self.path_rendered = Some(path_rendered.into());
        self
    }

    pub fn summarized(mut self) -> Self {
        self.summarized = Some(true);
        self
    }

    /// Allows flags in this update to be lowered
    ///
    /// Without this, a `Some(false)` flag is ignored.
    pub fn overriding(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn is_override(&self) -> bool {
        self.force
    }
}

/// Applies `update` to the entry for `item_id` as of `now`
///
/// Returns whether anything changed. `last_updated` on the entry and
/// `last_synced` on the header move only when it did.
pub fn apply_status(
    registry: &mut Registry,
    item_id: &str,
    update: StatusUpdate,
    now: DateTime<Utc>,
) -> RegistryResult<bool> {
    let entry = registry
        .items
        .get_mut(item_id)
        .ok_or_else(|| RegistryError::ItemNotFound(item_id.to_string()))?;

    let force = update.force;
    let mut changed = false;

    let mut flag = |slot: &mut bool, value: Option<bool>| {
        if let Some(value) = value {
            if *slot != value && (value || force) {
                *slot = value;
                changed = true;
            }
        }
    };
    flag(&mut entry.status.metadata_fetched, update.metadata_fetched);
    flag(&mut entry.status.transcript_downloaded, update.transcript_downloaded);
    flag(&mut entry.status.markdown_generated, update.markdown_generated);
    flag(&mut entry.status.summarized, update.summarized);

    if update.source.is_some() && entry.source != update.source {
        entry.source = update.source;
        changed = true;
    }
    if update.language.is_some() && entry.language != update.language {
        entry.language = update.language;
        changed = true;
    }
    if update.path_rendered.is_some() && entry.path_rendered != update.path_rendered {
        entry.path_rendered = update.path_rendered;
        changed = true;
    }
    if update.path_raw.is_some() && entry.path_raw != update.path_raw {
        entry.path_raw = update.path_raw;
        changed = true;
    }

    if changed {
        entry.last_updated = Some(now);
        registry.header.last_synced = Some(now);
    }

    Ok(changed)
}
