//! Ordered chain of acquisition strategies
//!
//! # Chain Flow
//!
//! For each strategy in priority order:
//! 1. Skip it silently if it has no credentials
//! 2. Stop with `Cancelled` if the token has fired
//! 3. Drive it through the retry controller
//! 4. Return the first non-empty payload
//! 5. Stop on `ContentAbsent`; no other strategy will find what is not there
//! 6. Otherwise fall through to the next strategy
//!
//! Strategy errors never escape the chain; they end up in
//! [`FetchOutcome::Absent`].

use crate::config::{Config, FetchMode};
use crate::fetcher::backoff::{AttemptOutcome, RetryController, RetryPolicy};
use crate::fetcher::direct::DirectStrategy;
use crate::fetcher::providers::ProviderStrategy;
use crate::fetcher::strategy::{
    build_http_client, FailureKind, FetchStrategy, StrategyError, StrategyKind, Transcript,
};
use crate::{AntennaError, ConfigError};
use tokio_util::sync::CancellationToken;

/// Result of fetching one item through the chain
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// A strategy produced a non-empty transcript
    Fetched(Transcript),
    /// No strategy produced a transcript
    ///
    /// `terminal` is true when a strategy established that the content does
    /// not exist, as opposed to every strategy failing or being exhausted.
    Absent {
        last_error: Option<StrategyError>,
        terminal: bool,
    },
    /// The cancellation token fired before the chain finished
    Cancelled,
}

impl FetchOutcome {
    pub fn is_fetched(&self) -> bool {
        matches!(self, Self::Fetched(_))
    }
}

/// Strategy order for a fetch mode
pub fn strategy_order(mode: FetchMode) -> Vec<StrategyKind> {
    let mut order = Vec::with_capacity(4);
    if mode.uses_providers() {
        order.extend([
            StrategyKind::ScrapingBee,
            StrategyKind::ScrapeNinja,
            StrategyKind::Firecrawl,
        ]);
    }
    if mode.uses_direct() {
        order.push(StrategyKind::Direct);
    }
    order
}

/// The fetch orchestrator
pub struct FetchChain {
    strategies: Vec<Box<dyn FetchStrategy>>,
    controller: RetryController,
}

impl FetchChain {
    /// Creates a chain from an explicit, already ordered strategy list
    pub fn new(strategies: Vec<Box<dyn FetchStrategy>>, controller: RetryController) -> Self {
        Self {
            strategies,
            controller,
        }
    }

    /// Builds the chain for the configured fetch mode
    ///
    /// Provider credentials are resolved here, once.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let fetch = &config.fetch;
        let client = build_http_client(fetch)?;
        let invalid = |e: url::ParseError| AntennaError::Config(ConfigError::InvalidUrl(e.to_string()));

        let mut strategies: Vec<Box<dyn FetchStrategy>> = Vec::new();
        for kind in strategy_order(fetch.mode) {
            let strategy: Box<dyn FetchStrategy> = match kind {
                StrategyKind::ScrapingBee => Box::new(
                    ProviderStrategy::new(
                        kind,
                        client.clone(),
                        &config.strategies.scrapingbee,
                        &fetch.watch_base_url,
                    )
                    .map_err(invalid)?,
                ),
                StrategyKind::ScrapeNinja => Box::new(
                    ProviderStrategy::new(
                        kind,
                        client.clone(),
                        &config.strategies.scrapeninja,
                        &fetch.watch_base_url,
                    )
                    .map_err(invalid)?,
                ),
                StrategyKind::Firecrawl => Box::new(
                    ProviderStrategy::new(
                        kind,
                        client.clone(),
                        &config.strategies.firecrawl,
                        &fetch.watch_base_url,
                    )
                    .map_err(invalid)?,
                ),
                StrategyKind::Direct => Box::new(
                    DirectStrategy::new(client.clone(), &fetch.watch_base_url).map_err(invalid)?,
                ),
            };

            tracing::info!(
                strategy = strategy.name(),
                configured = strategy.is_configured(),
                "Fetch strategy"
            );
            strategies.push(strategy);
        }

        let chain = Self::new(
            strategies,
            RetryController::new(RetryPolicy::from_config(fetch)),
        );
        if chain.configured().is_empty() {
            tracing::warn!(mode = %fetch.mode, "No fetch strategy is configured");
        }
        Ok(chain)
    }

    /// Kinds of the strategies that will actually be tried, in order
    pub fn configured(&self) -> Vec<StrategyKind> {
        self.strategies
            .iter()
            .filter(|s| s.is_configured())
            .map(|s| s.kind())
            .collect()
    }

    pub fn controller(&self) -> &RetryController {
        &self.controller
    }

    /// The strategy the health probe should use
    ///
    /// Direct access when the chain contains it, otherwise the first
    /// configured provider.
    pub fn probe_strategy(&self) -> Option<&dyn FetchStrategy> {
        self.strategies
            .iter()
            .find(|s| s.kind() == StrategyKind::Direct && s.is_configured())
            .or_else(|| self.strategies.iter().find(|s| s.is_configured()))
            .map(|s| s.as_ref())
    }

    /// Fetches the transcript for `item_id`
    pub async fn fetch(
        &self,
        item_id: &str,
        languages: &[String],
        cancel: &CancellationToken,
    ) -> FetchOutcome {
        let mut last_error = None;

        for strategy in &self.strategies {
            if !strategy.is_configured() {
                continue;
            }
            if cancel.is_cancelled() {
                return FetchOutcome::Cancelled;
            }

            tracing::debug!(item_id, strategy = strategy.name(), "Trying strategy");
            let report = self
                .controller
                .run(strategy.as_ref(), item_id, languages, cancel)
                .await;

            match report.outcome {
                AttemptOutcome::Succeeded(transcript) => {
                    tracing::info!(
                        item_id,
                        strategy = strategy.name(),
                        attempts = report.attempts,
                        source = %transcript.source,
                        language = %transcript.language,
                        "Fetched transcript"
                    );
                    return FetchOutcome::Fetched(transcript);
                }
                AttemptOutcome::Cancelled => return FetchOutcome::Cancelled,
                AttemptOutcome::Failed(error) if error.kind == FailureKind::ContentAbsent => {
                    return FetchOutcome::Absent {
                        last_error: Some(error),
                        terminal: true,
                    };
                }
                AttemptOutcome::Failed(error) => {
                    tracing::warn!(
                        item_id,
                        strategy = strategy.name(),
                        attempts = report.attempts,
                        state = %report.final_state,
                        error = %error,
                        "Strategy gave up; falling through"
                    );
                    last_error = Some(error);
                }
            }
        }

        FetchOutcome::Absent {
            last_error,
            terminal: false,
        }
    }
}
