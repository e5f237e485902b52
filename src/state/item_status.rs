/// Per-item processing state
///
/// Stage-completion flags, the processing stages they gate, and the
/// provenance of an acquired transcript.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Independent stage-completion flags for one item
///
/// Flags only move from `false` to `true` during normal operation; see
/// [`crate::registry::merge::apply_status`] for the one place that may lower
/// them, and only on explicit override.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStatus {
    pub metadata_fetched: bool,
    pub transcript_downloaded: bool,
    pub markdown_generated: bool,
    pub summarized: bool,
}

impl ItemStatus {
    /// Returns true if the item still needs work for `stage`
    pub fn needs(&self, stage: Stage) -> bool {
        match stage {
            Stage::Fetch => !self.transcript_downloaded,
            Stage::Render => self.transcript_downloaded && !self.markdown_generated,
            Stage::Summarize => self.markdown_generated && !self.summarized,
        }
    }

    /// Returns true if every stage has completed
    pub fn is_complete(&self) -> bool {
        self.metadata_fetched
            && self.transcript_downloaded
            && self.markdown_generated
            && self.summarized
    }
}

/// A processing stage selectable by the pending-work selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Fetch,
    Render,
    Summarize,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::Render => "render",
            Self::Summarize => "summarize",
        }
    }

    /// Parses a stage name; `transcript`, `markdown` and `summary` are accepted as aliases
    pub fn from_name(s: &str) -> Option<Self> {
        match s {
            "fetch" | "transcript" => Some(Self::Fetch),
            "render" | "markdown" => Some(Self::Render),
            "summarize" | "summary" => Some(Self::Summarize),
            _ => None,
        }
    }

    pub fn all() -> [Self; 3] {
        [Self::Fetch, Self::Render, Self::Summarize]
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| {
            format!(
                "unknown stage '{}', expected one of: fetch, render, summarize",
                s
            )
        })
    }
}

/// How a transcript was acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TranscriptSource {
    #[serde(rename = "manual")]
    Manual,
    #[serde(rename = "auto-generated")]
    AutoGenerated,
    #[serde(rename = "proxy-scraped")]
    ProxyScraped,
}

impl TranscriptSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::AutoGenerated => "auto-generated",
            Self::ProxyScraped => "proxy-scraped",
        }
    }
}

impl fmt::Display for TranscriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
