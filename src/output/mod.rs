//! Output module for documents and derived collection artifacts
//!
//! This module handles:
//! - Rendering transcripts as markdown documents
//! - Writing the raw payload so later stages can resume without refetching
//! - Building the derived `index.json`
//! - Counting and printing collection statistics
//!
//! Everything written here is a projection of the registry and can be
//! regenerated from it.

mod index;
mod markdown;
pub mod stats;
mod traits;

pub use index::{write_index, CollectionIndex, INDEX_FILENAME};
pub use markdown::{file_name, format_document, format_duration, slugify, MarkdownRenderer};
pub use stats::{print_statistics, CollectionStatistics, StageCounts};
pub use traits::{OutputError, OutputResult, RenderContext, Renderer};

use crate::registry::atomic_write;
use std::path::{Path, PathBuf};

/// Directory under the collection that holds raw payloads
pub const RAW_DIR: &str = "raw";

/// Writes the acquired payload to `raw/<escaped item_id>.txt`
///
/// Returns the path relative to `collection_dir`.
pub fn write_raw(collection_dir: &Path, item_id: &str, payload: &str) -> OutputResult<PathBuf> {
    let relative = raw_path(item_id)?;
    atomic_write(&collection_dir.join(&relative), payload.as_bytes())?;
    Ok(relative)
}

/// Reads a payload previously stored with [`write_raw`]
pub fn read_raw(collection_dir: &Path, relative: &str) -> OutputResult<String> {
    Ok(std::fs::read_to_string(collection_dir.join(relative))?)
}

/// Maps an item id to its payload file under `raw/`
///
/// Bytes outside `[A-Za-z0-9_-]` are written as `%XX`, so any id yields a
/// single path component and distinct ids never share a file.
fn raw_path(item_id: &str) -> OutputResult<PathBuf> {
    if item_id.is_empty() {
        return Err(OutputError::Write("empty item id".to_string()));
    }
    let mut name = String::with_capacity(item_id.len() + 4);
    for byte in item_id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            name.push(char::from(byte));
        } else {
            name.push_str(&format!("%{:02X}", byte));
        }
    }
    name.push_str(".txt");
    Ok(PathBuf::from(RAW_DIR).join(name))
}
