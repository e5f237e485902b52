//! Registry module for persisting per-collection ingestion state
//!
//! This module handles everything that touches a collection's registry:
//! - The registry data model (header, item entries, discovered descriptors)
//! - Atomic JSON persistence with an optional cross-process lock
//! - Merging freshly discovered items without regressing progress
//! - Selecting the items that still need a processing stage
//!
//! The registry file is the single source of truth for a collection; rendered
//! documents and the index are projections that can be regenerated from it.

mod lock;
pub mod merge;
mod pending;
mod store;
mod traits;

pub use lock::{FileLocker, LockGuard, NoopLocker};
pub use merge::{apply_status, merge_discovered, MergeOptions, MergeReport, StatusUpdate};
pub use pending::{pending, publication_order};
pub use store::{list_collections, registry_path, RegistryStore};
pub use traits::{Locker, RegistryError, RegistryResult};

pub(crate) use store::atomic_write;

use crate::state::{ItemStatus, TranscriptSource};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Version written into every new registry header
pub const SCHEMA_VERSION: &str = "1.0.0";

/// File name of the registry inside a collection directory
pub const REGISTRY_FILENAME: &str = "antenna.json";

/// Registry metadata for one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionHeader {
    pub schema_version: String,
    pub collection_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
}

impl CollectionHeader {
    /// Creates a header for a new collection at the current schema version
    pub fn new(collection_id: impl Into<String>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            collection_id: collection_id.into(),
            display_name: None,
            handle: None,
            last_synced: None,
        }
    }

    pub fn with_display_name(mut self, name: Option<String>) -> Self {
        self.display_name = name;
        self
    }

    pub fn with_handle(mut self, handle: Option<String>) -> Self {
        self.handle = handle;
        self
    }

    /// Name used for human-facing output: display name, then handle, then id
    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .or(self.handle.as_deref())
            .unwrap_or(&self.collection_id)
    }
}

/// Metadata, provenance, output locations and status for one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemEntry {
    pub item_id: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    pub duration_sec: Option<u64>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub comment_count: Option<u64>,
    pub tags: Option<Vec<String>>,
    pub category: Option<String>,
    pub url: Option<String>,
    pub source: Option<TranscriptSource>,
    pub language: Option<String>,
    pub path_rendered: Option<String>,
    pub path_raw: Option<String>,
    pub status: ItemStatus,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Complete registry for one collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registry {
    pub header: CollectionHeader,
    pub items: BTreeMap<String, ItemEntry>,
}

impl Registry {
    pub fn new(header: CollectionHeader) -> Self {
        Self {
            header,
            items: BTreeMap::new(),
        }
    }

    pub fn get(&self, item_id: &str) -> Option<&ItemEntry> {
        self.items.get(item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Checks the structural invariants serde cannot express
    ///
    /// Every key must equal its entry's `item_id`, and the schema major
    /// version must match the one this crate writes.
    pub fn check_invariants(&self) -> Result<(), String> {
        let ours = major_version(SCHEMA_VERSION);
        let theirs = major_version(&self.header.schema_version);
        if ours != theirs {
            return Err(format!(
                "schema version {} is incompatible with {}",
                self.header.schema_version, SCHEMA_VERSION
            ));
        }

        for (key, entry) in &self.items {
            if key != &entry.item_id {
                return Err(format!(
                    "key '{}' does not match item_id '{}'",
                    key, entry.item_id
                ));
            }
        }

        Ok(())
    }
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// A freshly discovered item, as produced by a metadata enricher
///
/// Only `item_id` is required. Absent fields never overwrite data already in
/// the registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub item_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_sec: Option<u64>,
    #[serde(default)]
    pub view_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub comment_count: Option<u64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    /// Pre-set status, honoured only for bulk initialization
    #[serde(default)]
    pub status: Option<ItemStatus>,
}

impl ItemDescriptor {
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            ..Default::default()
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_published_at(mut self, published_at: DateTime<Utc>) -> Self {
        self.published_at = Some(published_at);
        self
    }

    /// True if the descriptor carries directory-API enrichment beyond id and title
    pub fn is_enriched(&self) -> bool {
        self.duration_sec.is_some()
            || self.view_count.is_some()
            || self.like_count.is_some()
            || self.comment_count.is_some()
    }
}

/// Accepts RFC 3339 timestamps as well as bare `YYYY-MM-DD` dates (midnight UTC)
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };

    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }

    NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Some(naive.and_utc()))
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}
