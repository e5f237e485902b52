//! Configuration module for Antenna
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Every option the fetch pipeline recognises is enumerated here and handed to
//! the pipeline at construction; nothing downstream reads the environment.
//!
//! # Example
//!
//! ```no_run
//! use antenna::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("antenna.toml")).unwrap();
//! println!("Fetch mode: {}", config.fetch.mode);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, FetchConfig, FetchMode, OnBlock, ProbeConfig, RegistryConfig, StrategiesConfig,
    StrategyCredentials, SummarizerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
