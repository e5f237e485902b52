//! Antenna: resumable transcript ingestion
//!
//! This crate keeps a durable per-collection registry of which processing
//! stages every item has completed, and fetches item transcripts through an
//! ordered chain of acquisition strategies with per-strategy retry and backoff.

pub mod config;
pub mod discovery;
pub mod fetcher;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod state;
pub mod summarizer;

use thiserror::Error;

/// Main error type for Antenna operations
#[derive(Debug, Error)]
pub enum AntennaError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] registry::RegistryError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Failed to resolve collection '{reference}': {message}")]
    Resolve { reference: String, message: String },

    #[error("Failed to enrich item metadata: {0}")]
    Enrich(String),

    #[error("Upstream access is blocked: {detail}")]
    Blocked { detail: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Antenna operations
pub type Result<T> = std::result::Result<T, AntennaError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use fetcher::{FetchChain, FetchOutcome, Transcript};
pub use registry::{ItemDescriptor, ItemEntry, Registry, RegistryStore};
pub use state::{ItemStatus, Stage, TranscriptSource};
