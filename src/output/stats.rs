//! Statistics generation from collection registries
//!
//! This module provides functionality for counting stage progress in a
//! registry and displaying it.

use crate::registry::{pending, Registry};
use crate::state::{Stage, TranscriptSource};
use serde::Serialize;
use std::collections::BTreeMap;

/// Item counts per completed and pending stage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub total: usize,
    pub metadata_fetched: usize,
    pub transcripts_downloaded: usize,
    pub markdown_generated: usize,
    pub summarized: usize,
    pub pending_fetch: usize,
    pub pending_render: usize,
    pub pending_summarize: usize,
}

impl StageCounts {
    pub fn from_registry(registry: &Registry) -> Self {
        let mut counts = Self {
            total: registry.len(),
            ..Default::default()
        };

        for entry in registry.items.values() {
            let status = &entry.status;
            counts.metadata_fetched += usize::from(status.metadata_fetched);
            counts.transcripts_downloaded += usize::from(status.transcript_downloaded);
            counts.markdown_generated += usize::from(status.markdown_generated);
            counts.summarized += usize::from(status.summarized);
        }

        counts.pending_fetch = pending(registry, Stage::Fetch).len();
        counts.pending_render = pending(registry, Stage::Render).len();
        counts.pending_summarize = pending(registry, Stage::Summarize).len();
        counts
    }
}

/// Collection statistics summary
#[derive(Debug, Clone)]
pub struct CollectionStatistics {
    /// Human-facing collection name
    pub label: String,

    pub counts: StageCounts,

    /// Count of downloaded transcripts by provenance
    pub by_source: BTreeMap<&'static str, usize>,

    /// Count of downloaded transcripts by language
    pub by_language: BTreeMap<String, usize>,
}

impl CollectionStatistics {
    pub fn from_registry(registry: &Registry) -> Self {
        let mut by_source = BTreeMap::new();
        let mut by_language = BTreeMap::new();

        for entry in registry.items.values() {
            if !entry.status.transcript_downloaded {
                continue;
            }
            let source = entry.source.map(|s: TranscriptSource| s.as_str()).unwrap_or("unknown");
            *by_source.entry(source).or_insert(0) += 1;
            let language = entry.language.clone().unwrap_or_else(|| "unknown".to_string());
            *by_language.entry(language).or_insert(0) += 1;
        }

        Self {
            label: registry.header.label().to_string(),
            counts: StageCounts::from_registry(registry),
            by_source,
            by_language,
        }
    }

    /// Percentage of items with a downloaded transcript
    pub fn completion_rate(&self) -> f64 {
        if self.counts.total == 0 {
            0.0
        } else {
            self.counts.transcripts_downloaded as f64 / self.counts.total as f64 * 100.0
        }
    }
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CollectionStatistics) {
    let counts = &stats.counts;
    println!("=== Collection Statistics: {} ===\n", stats.label);

    println!("Overview:");
    println!("  Items known: {}", counts.total);
    println!("  Metadata fetched: {}", counts.metadata_fetched);
    println!("  Transcripts downloaded: {}", counts.transcripts_downloaded);
    println!("  Markdown generated: {}", counts.markdown_generated);
    println!("  Summarized: {}", counts.summarized);
    println!();

    println!("Pending:");
    println!("  fetch: {}", counts.pending_fetch);
    println!("  render: {}", counts.pending_render);
    println!("  summarize: {}", counts.pending_summarize);
    println!();

    if !stats.by_source.is_empty() {
        println!("Transcripts by Source:");
        for (source, count) in &stats.by_source {
            println!("  {}: {}", source, count);
        }
        println!();
    }

    if !stats.by_language.is_empty() {
        println!("Transcripts by Language:");
        let mut languages: Vec<_> = stats.by_language.iter().collect();
        languages.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        for (language, count) in languages {
            println!("  {}: {}", language, count);
        }
        println!();
    }

    println!(
        "Completion: {:.1}% ({} / {} transcripts downloaded)",
        stats.completion_rate(),
        counts.transcripts_downloaded,
        counts.total
    );
}
