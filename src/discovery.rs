//! Collection identity resolution and item metadata enrichment
//!
//! Both are collaborators at their interface only. The shipped
//! implementations resolve identities given on the command line and read
//! item descriptors from a JSON file produced by an external lister.

use crate::registry::{registry_path, CollectionHeader, ItemDescriptor};
use crate::{AntennaError, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A collection identity as returned by a resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCollection {
    pub collection_id: String,
    pub display_name: Option<String>,
    pub handle: Option<String>,
}

impl ResolvedCollection {
    pub fn header(&self) -> CollectionHeader {
        CollectionHeader::new(self.collection_id.clone())
            .with_display_name(self.display_name.clone())
            .with_handle(self.handle.clone())
    }

    /// Directory name for the collection under the vault root
    ///
    /// Uses the display name when it is a safe path component, otherwise the
    /// collection id.
    pub fn dir_name(&self) -> String {
        self.display_name
            .as_deref()
            .map(sanitize_component)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| sanitize_component(&self.collection_id))
    }

    /// Directory holding this collection under `root`
    ///
    /// An existing registry wins, whether it was created under the display
    /// name or under the bare id, so runs with and without a display name
    /// share one registry. A new collection goes under [`Self::dir_name`].
    pub fn locate(&self, root: &Path) -> PathBuf {
        let preferred = root.join(self.dir_name());
        let by_id = root.join(sanitize_component(&self.collection_id));
        let existing = [&preferred, &by_id]
            .into_iter()
            .find(|dir| registry_path(dir).is_file())
            .cloned();
        existing.unwrap_or(preferred)
    }
}

fn sanitize_component(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim()
        .trim_matches('.')
        .to_string()
}

/// Resolves a user-supplied collection reference to its identity
///
/// Failure is fatal to the run, never to an existing registry.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<ResolvedCollection>;
}

/// Looks up full metadata for a set of item ids
#[async_trait]
pub trait MetadataEnricher: Send + Sync {
    async fn enrich(&self, item_ids: &[String]) -> Result<Vec<ItemDescriptor>>;
}

/// Resolver for identities that are already known
///
/// The reference is taken as the collection id verbatim.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    display_name: Option<String>,
    handle: Option<String>,
}

impl StaticResolver {
    pub fn new(display_name: Option<String>, handle: Option<String>) -> Self {
        Self {
            display_name,
            handle,
        }
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve(&self, reference: &str) -> Result<ResolvedCollection> {
        let collection_id = reference.trim();
        if collection_id.is_empty() {
            return Err(AntennaError::Resolve {
                reference: reference.to_string(),
                message: "empty collection reference".to_string(),
            });
        }

        Ok(ResolvedCollection {
            collection_id: collection_id.to_string(),
            display_name: self.display_name.clone(),
            handle: self.handle.clone(),
        })
    }
}

/// Item descriptors stored as a JSON array on disk
#[derive(Debug, Clone)]
pub struct DescriptorFile {
    path: PathBuf,
}

impl DescriptorFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads every descriptor in the file
    pub async fn load_all(&self) -> Result<Vec<ItemDescriptor>> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        serde_json::from_str(&content).map_err(|e| {
            AntennaError::Enrich(format!("{}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl MetadataEnricher for DescriptorFile {
    /// Returns the descriptors for `item_ids`, or all of them if empty
    async fn enrich(&self, item_ids: &[String]) -> Result<Vec<ItemDescriptor>> {
        let all = self.load_all().await?;
        if item_ids.is_empty() {
            return Ok(all);
        }

        let wanted: HashSet<&str> = item_ids.iter().map(String::as_str).collect();
        Ok(all
            .into_iter()
            .filter(|d| wanted.contains(d.item_id.as_str()))
            .collect())
    }
}
