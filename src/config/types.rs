use serde::Deserialize;
use std::fmt;
use std::time::Duration;

/// Main configuration structure for Antenna
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub strategies: StrategiesConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub summarizer: Option<SummarizerConfig>,
}

/// Where registries live and how they are serialized across processes
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    /// Vault root; every collection gets its own directory below it
    #[serde(default = "default_root")]
    pub root: String,

    /// Take the cross-process advisory lock around registry updates
    #[serde(default = "default_true")]
    pub lock: bool,

    /// How long to wait for the lock before giving up (seconds)
    #[serde(rename = "lock-timeout-secs", default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            lock: true,
            lock_timeout_secs: default_lock_timeout_secs(),
        }
    }
}

impl RegistryConfig {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Which acquisition strategies the chain is built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchMode {
    /// Scraping providers first, then direct access
    #[default]
    ChainThenDirect,
    /// Scraping providers only
    ChainOnly,
    /// Direct access only
    DirectOnly,
}

impl FetchMode {
    pub fn uses_providers(&self) -> bool {
        matches!(self, Self::ChainThenDirect | Self::ChainOnly)
    }

    pub fn uses_direct(&self) -> bool {
        matches!(self, Self::ChainThenDirect | Self::DirectOnly)
    }
}

impl fmt::Display for FetchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ChainThenDirect => "chain-then-direct",
            Self::ChainOnly => "chain-only",
            Self::DirectOnly => "direct-only",
        };
        write!(f, "{}", s)
    }
}

/// Fetch chain and retry/backoff behavior
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub mode: FetchMode,

    /// Maximum attempts per strategy before falling through
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (milliseconds)
    #[serde(rename = "initial-delay-ms", default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    #[serde(rename = "backoff-multiplier", default = "default_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound for a single backoff step (milliseconds)
    #[serde(rename = "backoff-ceiling-ms", default = "default_ceiling_ms")]
    pub backoff_ceiling_ms: u64,

    #[serde(rename = "jitter-min", default = "default_jitter_min")]
    pub jitter_min: f64,

    #[serde(rename = "jitter-max", default = "default_jitter_max")]
    pub jitter_max: f64,

    /// Per-call HTTP timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Preferred transcript languages, most preferred first
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Base URL of the content platform used for direct access
    #[serde(rename = "watch-base-url", default = "default_watch_base_url")]
    pub watch_base_url: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            mode: FetchMode::default(),
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_multiplier: default_multiplier(),
            backoff_ceiling_ms: default_ceiling_ms(),
            jitter_min: default_jitter_min(),
            jitter_max: default_jitter_max(),
            request_timeout_secs: default_request_timeout_secs(),
            languages: default_languages(),
            watch_base_url: default_watch_base_url(),
        }
    }
}

/// Credentials and endpoint override for one scraping provider
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategyCredentials {
    /// Inline API key
    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    /// Name of an environment variable holding the API key
    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,

    /// Override for the provider's API base URL
    #[serde(rename = "base-url", default)]
    pub base_url: Option<String>,
}

impl StrategyCredentials {
    /// Resolves the API key, preferring the inline value over the environment
    ///
    /// Called once when the fetch chain is built. Empty values count as absent.
    pub fn resolve_key(&self) -> Option<String> {
        pick_key(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

/// Per-provider configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StrategiesConfig {
    #[serde(default)]
    pub scrapingbee: StrategyCredentials,
    #[serde(default)]
    pub scrapeninja: StrategyCredentials,
    #[serde(default)]
    pub firecrawl: StrategyCredentials,
}

/// What to do when the health probe reports a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OnBlock {
    /// Log a warning and continue
    #[default]
    Warn,
    /// Stop before fetching anything
    Abort,
}

/// Health probe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// A historically stable item used to detect blocks
    #[serde(rename = "reference-item", default = "default_reference_item")]
    pub reference_item: String,

    #[serde(rename = "on-block", default)]
    pub on_block: OnBlock,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            reference_item: default_reference_item(),
            on_block: OnBlock::default(),
        }
    }
}

/// Optional summarization endpoint (OpenAI-compatible chat completions)
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    pub endpoint: String,

    pub model: String,

    #[serde(rename = "api-key", default)]
    pub api_key: Option<String>,

    #[serde(rename = "api-key-env", default)]
    pub api_key_env: Option<String>,

    /// Transcripts longer than this are truncated before summarizing
    #[serde(rename = "max-input-chars", default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

impl SummarizerConfig {
    /// Resolves the API key the same way provider credentials are resolved
    pub fn resolve_key(&self) -> Option<String> {
        pick_key(self.api_key.as_deref(), self.api_key_env.as_deref())
    }
}

/// Inline key if non-blank, else the named environment variable if non-blank
fn pick_key(inline: Option<&str>, env_name: Option<&str>) -> Option<String> {
    let usable = |key: &str| !key.trim().is_empty();
    inline
        .filter(|key| usable(key))
        .map(str::to_string)
        .or_else(|| {
            env_name
                .and_then(|name| std::env::var(name).ok())
                .filter(|key| usable(key))
        })
}

fn default_root() -> String {
    "./vault".to_string()
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_ceiling_ms() -> u64 {
    60_000
}

fn default_jitter_min() -> f64 {
    0.8
}

fn default_jitter_max() -> f64 {
    1.2
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string(), "en-US".to_string(), "en-GB".to_string()]
}

fn default_watch_base_url() -> String {
    "https://www.youtube.com".to_string()
}

fn default_reference_item() -> String {
    "jNQXAC9IVRw".to_string()
}

fn default_max_input_chars() -> usize {
    12_000
}
