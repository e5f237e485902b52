//! Pipeline coordinator - per-collection ingestion orchestration
//!
//! This module drives one collection's items through the processing stages:
//! - Merging discovered items into the registry
//! - Gating the run on the health probe
//! - Fetching pending items through the strategy chain
//! - Storing the raw payload, summarizing and rendering
//! - Writing every stage result back under the registry lock
//! - Rebuilding the derived index
//!
//! Items are processed sequentially. Network I/O happens outside the lock;
//! each registry write is a separate locked read-modify-write.

use crate::config::{Config, OnBlock};
use crate::discovery::{MetadataEnricher, ResolvedCollection};
use crate::fetcher::{FetchChain, FetchOutcome, HealthProbe, ProbeReport, Transcript};
use crate::output::{self, MarkdownRenderer, RenderContext, Renderer};
use crate::registry::{
    apply_status, merge_discovered, pending, publication_order, ItemDescriptor, ItemEntry,
    MergeOptions, MergeReport, Registry, RegistryStore, StatusUpdate,
};
use crate::state::Stage;
use crate::summarizer::{ChatSummarizer, Summarizer};
use crate::{AntennaError, Result};
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// What a run should do
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Stages to work on, in processing order
    pub stages: Vec<Stage>,
    /// Maximum number of items to fetch
    pub limit: Option<usize>,
    /// Run the health probe first
    pub probe: bool,
    /// Proceed even if the probe reports a block and the config says abort
    pub force: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            stages: Stage::all().to_vec(),
            limit: None,
            probe: true,
            force: false,
        }
    }
}

/// Counts of what a run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: usize,
    /// Items whose content was established as absent
    pub absent: usize,
    /// Items where every strategy failed or was exhausted
    pub exhausted: usize,
    pub rendered: usize,
    pub render_failed: usize,
    /// Items fetched but whose payload could not be written
    pub store_failed: usize,
    pub summarized: usize,
    pub cancelled: bool,
}

/// Main pipeline coordinator for one collection
pub struct Pipeline {
    collection_dir: PathBuf,
    store: RegistryStore,
    chain: FetchChain,
    renderer: Box<dyn Renderer>,
    summarizer: Option<Box<dyn Summarizer>>,
    probe: Option<HealthProbe>,
    on_block: OnBlock,
    languages: Vec<String>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Creates a pipeline with the markdown renderer and no summarizer or probe
    pub fn new(collection_dir: impl Into<PathBuf>, store: RegistryStore, chain: FetchChain) -> Self {
        Self {
            collection_dir: collection_dir.into(),
            store,
            chain,
            renderer: Box::new(MarkdownRenderer::new()),
            summarizer: None,
            probe: None,
            on_block: OnBlock::default(),
            languages: crate::config::FetchConfig::default().languages,
            cancel: CancellationToken::new(),
        }
    }

    /// Builds the full pipeline described by `config`
    pub fn from_config(config: &Config, collection_dir: impl Into<PathBuf>) -> Result<Self> {
        let mut pipeline = Self::new(
            collection_dir,
            RegistryStore::from_config(&config.registry),
            FetchChain::from_config(config)?,
        )
        .with_languages(config.fetch.languages.clone());

        if config.probe.enabled {
            pipeline = pipeline.with_probe(
                HealthProbe::from_config(&config.probe, &config.fetch.languages),
                config.probe.on_block,
            );
        }
        if let Some(summarizer) = &config.summarizer {
            pipeline = pipeline.with_summarizer(Box::new(ChatSummarizer::from_config(summarizer)?));
        }
        Ok(pipeline)
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_summarizer(mut self, summarizer: Box<dyn Summarizer>) -> Self {
        self.summarizer = Some(summarizer);
        self
    }

    pub fn with_probe(mut self, probe: HealthProbe, on_block: OnBlock) -> Self {
        self.probe = Some(probe);
        self.on_block = on_block;
        self
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn collection_dir(&self) -> &Path {
        &self.collection_dir
    }

    pub fn store(&self) -> &RegistryStore {
        &self.store
    }

    pub fn load(&self) -> Result<Registry> {
        Ok(self.store.load(&self.collection_dir)?)
    }

    /// Creates the collection's registry if it does not exist yet
    pub async fn init_collection(&self, resolved: &ResolvedCollection) -> Result<Registry> {
        Ok(self
            .store
            .init_async(&self.collection_dir, resolved.header(), Vec::new())
            .await?)
    }

    /// Merges enriched descriptors for `item_ids` into the registry
    ///
    /// Descriptors that carry directory metadata mark `metadata_fetched`.
    pub async fn discover(
        &self,
        enricher: &dyn MetadataEnricher,
        item_ids: &[String],
    ) -> Result<MergeReport> {
        let descriptors = enricher.enrich(item_ids).await?;
        self.merge(descriptors).await
    }

    /// Merges already enriched descriptors into the registry
    pub async fn merge(&self, descriptors: Vec<ItemDescriptor>) -> Result<MergeReport> {
        let enriched: Vec<String> = descriptors
            .iter()
            .filter(|d| d.is_enriched())
            .map(|d| d.item_id.trim().to_string())
            .collect();

        let (_, report) = self
            .store
            .update_async(&self.collection_dir, |registry| {
                let now = Utc::now();
                let report = merge_discovered(registry, descriptors, MergeOptions::sync());
                for item_id in &enriched {
                    if registry.items.contains_key(item_id) {
                        apply_status(registry, item_id, StatusUpdate::new().metadata_fetched(), now)?;
                    }
                }
                Ok(report)
            })
            .await?;

        tracing::info!(
            inserted = report.inserted,
            refreshed = report.refreshed,
            skipped = report.skipped,
            "Merged discovered items"
        );
        Ok(report)
    }

    /// Runs the health probe, applying the configured response to a block
    ///
    /// Returns `Ok(None)` if no probe is configured and
    /// `Err(AntennaError::Blocked)` if the run must stop.
    pub async fn probe(&self, force: bool) -> Result<Option<ProbeReport>> {
        let Some(probe) = &self.probe else {
            return Ok(None);
        };

        let report = probe.probe(&self.chain, &self.cancel).await;
        if report.is_blocked {
            match self.on_block {
                OnBlock::Warn => {
                    tracing::warn!(detail = %report.detail, "Upstream appears blocked; continuing");
                }
                OnBlock::Abort if force => {
                    tracing::warn!(detail = %report.detail, "Upstream appears blocked; continuing because of --force");
                }
                OnBlock::Abort => {
                    return Err(AntennaError::Blocked {
                        detail: report.detail,
                    });
                }
            }
        }
        Ok(Some(report))
    }

    /// Runs the selected stages over the collection's pending items
    pub async fn run(&self, options: &RunOptions) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        if options.probe && options.stages.contains(&Stage::Fetch) {
            self.probe(options.force).await?;
        }

        for stage in Stage::all() {
            if !options.stages.contains(&stage) || summary.cancelled {
                continue;
            }
            match stage {
                Stage::Fetch => self.fetch_stage(options.limit, &mut summary).await?,
                Stage::Render => self.render_stage(&mut summary).await?,
                Stage::Summarize => self.summarize_stage(&mut summary).await?,
            }
        }

        let registry = self.load()?;
        output::write_index(&self.collection_dir, &registry)?;

        tracing::info!(
            fetched = summary.fetched,
            absent = summary.absent,
            exhausted = summary.exhausted,
            rendered = summary.rendered,
            store_failed = summary.store_failed,
            summarized = summary.summarized,
            cancelled = summary.cancelled,
            "Run finished"
        );
        Ok(summary)
    }

    async fn fetch_stage(&self, limit: Option<usize>, summary: &mut RunSummary) -> Result<()> {
        let registry = self.load()?;
        let ids: Vec<String> = pending(&registry, Stage::Fetch)
            .into_iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(|entry| entry.item_id.clone())
            .collect();
        tracing::info!(count = ids.len(), "Items pending fetch");

        for (position, item_id) in ids.iter().enumerate() {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            tracing::info!(item_id = %item_id, "Fetching {}/{}", position + 1, ids.len());
            match self.chain.fetch(item_id, &self.languages, &self.cancel).await {
                FetchOutcome::Fetched(transcript) => {
                    summary.fetched += 1;
                    match self.store_fetched(item_id, &transcript).await {
                        Ok(()) => self.finish_item(item_id, &transcript.text, summary).await?,
                        Err(AntennaError::Output(e)) => {
                            summary.store_failed += 1;
                            tracing::error!(
                                item_id = %item_id,
                                error = %e,
                                "Failed to store payload; item stays pending fetch"
                            );
                        }
                        Err(e) => return Err(e),
                    }
                }
                FetchOutcome::Absent {
                    last_error,
                    terminal: true,
                } => {
                    summary.absent += 1;
                    tracing::info!(
                        item_id = %item_id,
                        reason = %last_error.map(|e| e.message).unwrap_or_default(),
                        "No transcript available"
                    );
                }
                FetchOutcome::Absent { last_error, .. } => {
                    summary.exhausted += 1;
                    tracing::warn!(
                        item_id = %item_id,
                        last_error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
                        "All strategies failed; item stays pending"
                    );
                }
                FetchOutcome::Cancelled => {
                    summary.cancelled = true;
                    break;
                }
            }
        }
        Ok(())
    }

    /// Stores the payload and records the download
    async fn store_fetched(&self, item_id: &str, transcript: &Transcript) -> Result<()> {
        let raw = output::write_raw(&self.collection_dir, item_id, &transcript.text)?;
        let update = StatusUpdate::new().downloaded(
            transcript.source,
            transcript.language.clone(),
            raw.to_string_lossy(),
        );
        self.store
            .update_async(&self.collection_dir, |registry| {
                apply_status(registry, item_id, update, Utc::now())
            })
            .await?;
        Ok(())
    }

    /// Summarizes (if configured) and renders one downloaded item
    ///
    /// A render failure is logged and leaves the item pending render.
    async fn finish_item(&self, item_id: &str, payload: &str, summary: &mut RunSummary) -> Result<()> {
        let tldr = match &self.summarizer {
            Some(summarizer) => summarizer.summarize(payload).await,
            None => None,
        };

        let registry = self.load()?;
        let Some(item) = registry.get(item_id) else {
            return Err(crate::registry::RegistryError::ItemNotFound(item_id.to_string()).into());
        };

        let ctx = RenderContext {
            collection_dir: &self.collection_dir,
            header: &registry.header,
            index_number: index_number(&registry, item_id),
        };
        let path = match self.renderer.render(&ctx, item, payload, tldr.as_deref()) {
            Ok(path) => path,
            Err(e) => {
                summary.render_failed += 1;
                tracing::error!(item_id, error = %e, "Render failed; item stays pending render");
                return Ok(());
            }
        };

        let mut update = StatusUpdate::new().rendered(path.to_string_lossy());
        if tldr.is_some() {
            update = update.summarized();
            summary.summarized += 1;
        }
        self.store
            .update_async(&self.collection_dir, |registry| {
                apply_status(registry, item_id, update, Utc::now())
            })
            .await?;
        summary.rendered += 1;
        Ok(())
    }

    /// Renders items that were downloaded but never rendered
    async fn render_stage(&self, summary: &mut RunSummary) -> Result<()> {
        for item in self.pending_with_payload(Stage::Render)? {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.finish_item(&item.0, &item.1, summary).await?;
        }
        Ok(())
    }

    /// Re-renders rendered items with a summary, if a summarizer is configured
    async fn summarize_stage(&self, summary: &mut RunSummary) -> Result<()> {
        if self.summarizer.is_none() {
            tracing::debug!("No summarizer configured; skipping summarize stage");
            return Ok(());
        }
        for item in self.pending_with_payload(Stage::Summarize)? {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.finish_item(&item.0, &item.1, summary).await?;
        }
        Ok(())
    }

    /// Pending items for `stage` paired with their stored raw payload
    ///
    /// Items whose payload is missing are skipped with a warning; they need
    /// a refetch, which an explicit status override can request.
    fn pending_with_payload(&self, stage: Stage) -> Result<Vec<(String, String)>> {
        let registry = self.load()?;
        let mut ready = Vec::new();

        for entry in pending(&registry, stage) {
            match self.read_payload(entry) {
                Some(payload) => ready.push((entry.item_id.clone(), payload)),
                None => {
                    tracing::warn!(item_id = %entry.item_id, stage = %stage, "Raw payload missing; skipping")
                }
            }
        }
        Ok(ready)
    }

    fn read_payload(&self, entry: &ItemEntry) -> Option<String> {
        let relative = entry.path_raw.as_deref()?;
        match output::read_raw(&self.collection_dir, relative) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::debug!(item_id = %entry.item_id, error = %e, "Cannot read raw payload");
                None
            }
        }
    }
}

/// 1-based position of `item_id` in publication order
fn index_number(registry: &Registry, item_id: &str) -> usize {
    publication_order(registry)
        .iter()
        .position(|entry| entry.item_id == item_id)
        .map(|p| p + 1)
        .unwrap_or(registry.len() + 1)
}
