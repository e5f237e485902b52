//! The strategy capability and the failure model shared by every strategy
//!
//! A strategy makes exactly one acquisition attempt per call and reports
//! failure as a [`StrategyError`] carrying a [`FailureKind`]. Retrying is the
//! controller's job, never the strategy's.

use crate::config::FetchConfig;
use crate::state::TranscriptSource;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// User agent sent on every request
pub const USER_AGENT: &str = concat!(
    "Mozilla/5.0 (compatible; antenna/",
    env!("CARGO_PKG_VERSION"),
    ")"
);

/// The closed set of acquisition strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StrategyKind {
    ScrapingBee,
    ScrapeNinja,
    Firecrawl,
    Direct,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScrapingBee => "scrapingbee",
            Self::ScrapeNinja => "scrapeninja",
            Self::Firecrawl => "firecrawl",
            Self::Direct => "direct",
        }
    }

    /// Returns true for third-party scraping services
    pub fn is_provider(&self) -> bool {
        !matches!(self, Self::Direct)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How a failed attempt should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Temporary denial (rate limit, bot check); retry with backoff
    TransientBlock,
    /// The item has no acquirable content; stop the whole chain
    ContentAbsent,
    /// Anything else; retried like a block
    Unknown,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TransientBlock => "transient-block",
            Self::ContentAbsent => "content-absent",
            Self::Unknown => "unknown",
        }
    }

    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::ContentAbsent)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified failure of one strategy attempt
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct StrategyError {
    pub kind: FailureKind,
    pub message: String,
}

impl StrategyError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn blocked(message: impl Into<String>) -> Self {
        Self::new(FailureKind::TransientBlock, message)
    }

    pub fn absent(message: impl Into<String>) -> Self {
        Self::new(FailureKind::ContentAbsent, message)
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Unknown, message)
    }

    /// Classifies a non-success HTTP status
    ///
    /// | Status | From the platform | From a provider |
    /// |--------|-------------------|-----------------|
    /// | 429 | TransientBlock | TransientBlock |
    /// | 403 | TransientBlock | Unknown |
    /// | 404, 410 | ContentAbsent | Unknown |
    /// | other | Unknown | Unknown |
    pub fn from_status(status: StatusCode, from_platform: bool) -> Self {
        let message = format!("HTTP {}", status.as_u16());
        match status {
            StatusCode::TOO_MANY_REQUESTS => Self::blocked(message),
            StatusCode::FORBIDDEN if from_platform => Self::blocked(message),
            StatusCode::NOT_FOUND | StatusCode::GONE if from_platform => Self::absent(message),
            _ => Self::unknown(message),
        }
    }

    /// Classifies a transport-level error; these are never terminal
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::unknown("Request timeout")
        } else if e.is_connect() {
            Self::unknown(format!("Connection failed: {}", e))
        } else {
            Self::unknown(e.to_string())
        }
    }
}

/// A successfully acquired transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transcript {
    pub text: String,
    pub source: TranscriptSource,
    pub language: String,
}

/// One acquisition method in the fetch chain
#[async_trait]
pub trait FetchStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    /// Returns false if the strategy lacks credentials and must be skipped
    fn is_configured(&self) -> bool;

    /// Makes a single acquisition attempt for `item_id`
    async fn attempt_fetch(
        &self,
        item_id: &str,
        languages: &[String],
    ) -> Result<Transcript, StrategyError>;
}

/// Builds the HTTP client shared by all strategies
///
/// Every request carries the configured per-call timeout and a 10 second
/// connect timeout.
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}
