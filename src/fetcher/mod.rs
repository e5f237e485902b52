//! Fetcher module for acquiring item transcripts
//!
//! This module contains the resilient acquisition path:
//! - The strategy capability and shared failure classification
//! - Direct platform access and third-party scraping providers
//! - Watch-page and timed-text extraction
//! - Per-strategy retry with exponential backoff and jitter
//! - The ordered strategy chain and the pre-flight health probe

mod backoff;
mod chain;
mod direct;
mod extract;
mod probe;
mod providers;
mod strategy;

pub use backoff::{
    AttemptOutcome, AttemptReport, RetryController, RetryPolicy, Sleeper, TokioSleeper,
};
pub use chain::{strategy_order, FetchChain, FetchOutcome};
pub use direct::{watch_url, DirectStrategy};
pub use extract::{order_tracks, parse_timed_text, parse_watch_page, CaptionTrack, PlayerResponse};
pub use probe::{HealthProbe, ProbeReport};
pub use providers::{default_base_url, ProviderStrategy};
pub use strategy::{
    build_http_client, FailureKind, FetchStrategy, StrategyError, StrategyKind, Transcript,
    USER_AGENT,
};
