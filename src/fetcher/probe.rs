//! Pre-flight block detection
//!
//! Makes a single attempt for a reference item that is known to have
//! captions. A block on that item means every real fetch would be blocked
//! too. The probe never touches the registry.

use crate::config::ProbeConfig;
use crate::fetcher::chain::FetchChain;
use crate::fetcher::strategy::{FailureKind, FetchStrategy};
use tokio_util::sync::CancellationToken;

/// Outcome of a health probe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub is_blocked: bool,
    /// Human-readable detail, kept for unknown failures too
    pub detail: String,
    /// Name of the strategy that was probed, if any
    pub strategy: Option<&'static str>,
}

impl ProbeReport {
    fn clear(detail: impl Into<String>, strategy: Option<&'static str>) -> Self {
        Self {
            is_blocked: false,
            detail: detail.into(),
            strategy,
        }
    }
}

/// Health probe against a fixed reference item
#[derive(Debug, Clone)]
pub struct HealthProbe {
    reference_item: String,
    languages: Vec<String>,
}

impl HealthProbe {
    pub fn new(reference_item: impl Into<String>, languages: Vec<String>) -> Self {
        Self {
            reference_item: reference_item.into(),
            languages,
        }
    }

    pub fn from_config(config: &ProbeConfig, languages: &[String]) -> Self {
        Self::new(config.reference_item.clone(), languages.to_vec())
    }

    pub fn reference_item(&self) -> &str {
        &self.reference_item
    }

    /// Probes the chain's probe strategy
    pub async fn probe(&self, chain: &FetchChain, cancel: &CancellationToken) -> ProbeReport {
        match chain.probe_strategy() {
            Some(strategy) => self.probe_strategy(strategy, cancel).await,
            None => ProbeReport::clear("no configured strategy to probe", None),
        }
    }

    /// Makes exactly one attempt through `strategy`, without retries
    pub async fn probe_strategy(
        &self,
        strategy: &dyn FetchStrategy,
        cancel: &CancellationToken,
    ) -> ProbeReport {
        let name = Some(strategy.name());
        if cancel.is_cancelled() {
            return ProbeReport::clear("probe cancelled", name);
        }

        let result = tokio::select! {
            result = strategy.attempt_fetch(&self.reference_item, &self.languages) => result,
            _ = cancel.cancelled() => {
                return ProbeReport::clear("probe cancelled", name);
            }
        };

        let report = match result {
            Ok(transcript) => ProbeReport::clear(
                format!("reference item fetched ({} chars)", transcript.text.len()),
                name,
            ),
            Err(error) => match error.kind {
                FailureKind::TransientBlock => ProbeReport {
                    is_blocked: true,
                    detail: error.message,
                    strategy: name,
                },
                FailureKind::ContentAbsent => ProbeReport::clear(
                    format!("reference item has no content: {}", error.message),
                    name,
                ),
                FailureKind::Unknown => ProbeReport::clear(
                    format!("probe inconclusive: {}", error.message),
                    name,
                ),
            },
        };

        if report.is_blocked {
            tracing::warn!(
                strategy = strategy.name(),
                item_id = %self.reference_item,
                detail = %report.detail,
                "Health probe detected a block"
            );
        } else {
            tracing::info!(
                strategy = strategy.name(),
                detail = %report.detail,
                "Health probe passed"
            );
        }
        report
    }
}
