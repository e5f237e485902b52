use crate::config::types::{
    Config, FetchConfig, ProbeConfig, RegistryConfig, StrategiesConfig, SummarizerConfig,
};
use crate::ConfigError;
use url::Url;

/// Largest accepted jitter factor
const MAX_JITTER: f64 = 10.0;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_registry_config(&config.registry)?;
    validate_fetch_config(&config.fetch)?;
    validate_strategies(&config.strategies)?;
    validate_probe_config(&config.probe)?;
    if let Some(summarizer) = &config.summarizer {
        validate_summarizer_config(summarizer)?;
    }
    Ok(())
}

/// Validates registry configuration
fn validate_registry_config(config: &RegistryConfig) -> Result<(), ConfigError> {
    if config.root.trim().is_empty() {
        return Err(ConfigError::Validation(
            "registry root cannot be empty".to_string(),
        ));
    }

    if config.lock && config.lock_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "lock-timeout-secs must be >= 1 when locking is enabled".to_string(),
        ));
    }

    Ok(())
}

/// Validates fetch and backoff configuration
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.max_retries < 1 || config.max_retries > 20 {
        return Err(ConfigError::Validation(format!(
            "max-retries must be between 1 and 20, got {}",
            config.max_retries
        )));
    }

    if !(config.backoff_multiplier >= 1.0) {
        return Err(ConfigError::Validation(format!(
            "backoff-multiplier must be >= 1.0, got {}",
            config.backoff_multiplier
        )));
    }

    if config.backoff_ceiling_ms < config.initial_delay_ms {
        return Err(ConfigError::Validation(format!(
            "backoff-ceiling-ms ({}) must be >= initial-delay-ms ({})",
            config.backoff_ceiling_ms, config.initial_delay_ms
        )));
    }

    if !(config.jitter_min > 0.0)
        || config.jitter_min > config.jitter_max
        || !(config.jitter_max <= MAX_JITTER)
    {
        return Err(ConfigError::Validation(format!(
            "jitter band must satisfy 0 < jitter-min <= jitter-max <= 10, got [{}, {}]",
            config.jitter_min, config.jitter_max
        )));
    }

    if config.request_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "request-timeout-secs must be >= 1".to_string(),
        ));
    }

    if config.languages.is_empty() {
        return Err(ConfigError::Validation(
            "at least one preferred language is required".to_string(),
        ));
    }

    if config.languages.iter().any(|lang| lang.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "preferred languages cannot be empty strings".to_string(),
        ));
    }

    validate_base_url("watch-base-url", &config.watch_base_url)?;

    Ok(())
}

/// Validates provider endpoint overrides
fn validate_strategies(config: &StrategiesConfig) -> Result<(), ConfigError> {
    for (name, creds) in [
        ("scrapingbee", &config.scrapingbee),
        ("scrapeninja", &config.scrapeninja),
        ("firecrawl", &config.firecrawl),
    ] {
        if let Some(base) = &creds.base_url {
            validate_base_url(&format!("strategies.{}.base-url", name), base)?;
        }
    }
    Ok(())
}

/// Validates health probe configuration
fn validate_probe_config(config: &ProbeConfig) -> Result<(), ConfigError> {
    if config.enabled && config.reference_item.trim().is_empty() {
        return Err(ConfigError::Validation(
            "probe reference-item cannot be empty when the probe is enabled".to_string(),
        ));
    }
    Ok(())
}

/// Validates summarizer configuration
fn validate_summarizer_config(config: &SummarizerConfig) -> Result<(), ConfigError> {
    validate_base_url("summarizer.endpoint", &config.endpoint)?;

    if config.model.trim().is_empty() {
        return Err(ConfigError::Validation(
            "summarizer model cannot be empty".to_string(),
        ));
    }

    if config.max_input_chars == 0 {
        return Err(ConfigError::Validation(
            "summarizer max-input-chars must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates that a configured endpoint is an absolute http(s) URL
fn validate_base_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", field, value, e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "{} must use http or https, got '{}'",
            field, value
        )));
    }

    Ok(())
}
