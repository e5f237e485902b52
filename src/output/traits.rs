//! Output renderer traits and types
//!
//! This module defines the renderer capability the pipeline hands acquired
//! transcripts to, and the errors output operations can produce.

use crate::registry::{CollectionHeader, ItemEntry};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Write(String),

    #[error("Failed to format output: {0}")]
    Format(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Where and as what an item is being rendered
#[derive(Debug, Clone, Copy)]
pub struct RenderContext<'a> {
    /// The collection directory; rendered paths are relative to it
    pub collection_dir: &'a Path,

    pub header: &'a CollectionHeader,

    /// 1-based position of the item in publication order
    pub index_number: usize,
}

/// Turns an acquired transcript into a document on disk
pub trait Renderer: Send + Sync {
    /// Renders `item` and returns the written path relative to
    /// `ctx.collection_dir`
    ///
    /// Rendering is regenerable: an existing document at the same path is
    /// overwritten.
    fn render(
        &self,
        ctx: &RenderContext<'_>,
        item: &ItemEntry,
        payload: &str,
        summary: Option<&str>,
    ) -> OutputResult<PathBuf>;
}
