//! Configuration management for LinguaBox
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use linguabox::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Server listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `LINGUABOX__<section>__<key>`
//!
//! Examples:
//! - `LINGUABOX__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `LINGUABOX__BILLING__RATE_PER_THOUSAND=12`
//! - `LINGUABOX__PIPELINE__WORKER_CONCURRENCY=16`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/linguabox.toml`.
//! This can be overridden using the `LINGUABOX_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use models::{
    BillingConfig, Config, PipelineConfig, ServerConfig, StorageConfig, StorageProvider,
    TelemetryConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`LINGUABOX__*`)
    /// 2. TOML file (default: `config/linguabox.toml`)
    /// 3. Default values
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration file is malformed or a value
    /// fails validation.
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }
}
