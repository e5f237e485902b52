//! Derived `index.json` for a collection
//!
//! The index is a projection of the registry and is overwritten on every
//! build.

use crate::output::stats::StageCounts;
use crate::output::traits::OutputResult;
use crate::registry::{atomic_write, Registry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const INDEX_FILENAME: &str = "index.json";

/// Collection identity and per-stage counts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionIndex {
    pub collection_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
    pub last_synced: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub counts: StageCounts,
}

impl CollectionIndex {
    pub fn from_registry(registry: &Registry) -> Self {
        let header = &registry.header;
        Self {
            collection_id: header.collection_id.clone(),
            display_name: header.display_name.clone(),
            handle: header.handle.clone(),
            last_synced: header.last_synced,
            counts: StageCounts::from_registry(registry),
        }
    }
}

/// Writes `index.json` into `collection_dir` and returns its path
pub fn write_index(collection_dir: &Path, registry: &Registry) -> OutputResult<PathBuf> {
    let index = CollectionIndex::from_registry(registry);
    let mut json = serde_json::to_string_pretty(&index)?;
    json.push('\n');

    let path = collection_dir.join(INDEX_FILENAME);
    atomic_write(&path, json.as_bytes())?;
    tracing::debug!(path = %path.display(), total = index.counts.total, "Wrote index");
    Ok(path)
}
