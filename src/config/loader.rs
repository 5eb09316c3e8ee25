//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::http_source::HttpSourceConfig;
use crate::application::orchestrator::ScanSettings;
use crate::application::retry_fetcher::{RetryPolicy, DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY_MS};
use crate::domain::{ChainConfig, ChainEntry};

/// Environment override for the shared store path
pub const STORE_PATH_ENV: &str = "SCANNER_STORE_PATH";

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub scan: ScanSection,
    #[serde(default)]
    pub retry: RetrySection,
    pub store: StoreSection,
    #[serde(default)]
    pub banner: BannerSection,
    #[serde(default)]
    pub logging: LoggingSection,
    /// Canonical chain id -> display name and per-exchange labels
    #[serde(default)]
    pub chains: BTreeMap<String, ChainEntry>,
    /// Exchange id -> price gateway
    #[serde(default)]
    pub sources: BTreeMap<String, SourceSection>,
}

/// Scan pacing section
#[derive(Debug, Clone, Deserialize)]
pub struct ScanSection {
    /// Tokens per batch
    pub batch_size: usize,
    /// Pause between batches in milliseconds
    pub batch_delay_ms: u64,
    /// Pause between two source dispatches in milliseconds
    #[serde(default = "default_dispatch_delay_ms")]
    pub dispatch_delay_ms: u64,
    /// Exchanges to query, in dispatch order (defaults to every source)
    #[serde(default)]
    pub exchanges: Vec<String>,
}

fn default_dispatch_delay_ms() -> u64 {
    200
}

/// Retry fetcher section
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    /// Attempts per (token, exchange)
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

/// Shared store section
#[derive(Debug, Clone, Deserialize)]
pub struct StoreSection {
    /// JSON store file shared by every context
    pub path: String,
    /// How often the file is polled for writes from other processes
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl StoreSection {
    /// Get store path with environment variable override
    /// Checks SCANNER_STORE_PATH env var first, falls back to config value
    pub fn get_path(&self) -> PathBuf {
        let raw = std::env::var(STORE_PATH_ENV).unwrap_or_else(|_| self.path.clone());
        PathBuf::from(shellexpand::tilde(&raw).into_owned())
    }
}

/// Banner section (optional)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BannerSection {
    /// Chains always listed in the running-chains banner
    #[serde(default)]
    pub seed: Vec<String>,
}

/// Logging configuration section
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// One price gateway
#[derive(Debug, Clone, Deserialize)]
pub struct SourceSection {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    10
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate scan section
        if self.scan.batch_size == 0 {
            return Err(ConfigError::ValidationError(format!(
                "batch_size must be > 0, got {}",
                self.scan.batch_size
            )));
        }

        if self.scan.batch_delay_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "batch_delay_ms must be > 0, got {}",
                self.scan.batch_delay_ms
            )));
        }

        if self.scan.dispatch_delay_ms == 0 {
            return Err(ConfigError::ValidationError(format!(
                "dispatch_delay_ms must be > 0, got {}",
                self.scan.dispatch_delay_ms
            )));
        }

        for exchange in &self.scan.exchanges {
            if self.source(exchange).is_none() {
                return Err(ConfigError::ValidationError(format!(
                    "scan exchange {} has no [sources.{}] entry",
                    exchange, exchange
                )));
            }
        }

        // Validate retry section
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(format!(
                "max_attempts must be > 0, got {}",
                self.retry.max_attempts
            )));
        }

        // Validate store
        if self.store.path.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "store path cannot be empty".to_string(),
            ));
        }

        if self.store.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        // Validate logging
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "logging level must be one of {:?}, got {}",
                LOG_LEVELS, self.logging.level
            )));
        }

        // Validate chains and sources
        for (id, entry) in &self.chains {
            if id.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "chain id cannot be empty".to_string(),
                ));
            }
            if let Some((exchange, _)) = entry.cex_labels.iter().find(|(_, l)| l.trim().is_empty()) {
                return Err(ConfigError::ValidationError(format!(
                    "chain {} has an empty label for {}",
                    id, exchange
                )));
            }
        }

        for (exchange, source) in &self.sources {
            if !source.url.starts_with("http://") && !source.url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "source {} url must be http(s), got {}",
                    exchange, source.url
                )));
            }
            if source.timeout_secs == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "source {} timeout_secs must be > 0",
                    exchange
                )));
            }
        }

        Ok(())
    }

    fn source(&self, exchange: &str) -> Option<&SourceSection> {
        self.sources
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(exchange))
            .map(|(_, source)| source)
    }

    pub fn chain_config(&self) -> ChainConfig {
        let mut chains = ChainConfig::new();
        for (id, entry) in &self.chains {
            chains.insert(id, entry.clone());
        }
        chains
    }

    pub fn retry_policy(&self) -> Result<RetryPolicy, ConfigError> {
        RetryPolicy::new(
            self.retry.max_attempts,
            Duration::from_millis(self.retry.delay_ms),
        )
        .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Scan settings; exchanges default to every configured source
    pub fn scan_settings(&self) -> Result<ScanSettings, ConfigError> {
        let exchanges = if self.scan.exchanges.is_empty() {
            self.sources.keys().map(|e| e.to_uppercase()).collect()
        } else {
            self.scan.exchanges.iter().map(|e| e.to_uppercase()).collect()
        };

        Ok(ScanSettings {
            batch_size: self.scan.batch_size,
            batch_delay: Duration::from_millis(self.scan.batch_delay_ms),
            dispatch_delay: Duration::from_millis(self.scan.dispatch_delay_ms),
            exchanges,
            retry: self.retry_policy()?,
        })
    }

    pub fn source_configs(&self) -> Vec<HttpSourceConfig> {
        self.sources
            .iter()
            .map(|(exchange, source)| HttpSourceConfig {
                exchange: exchange.clone(),
                base_url: source.url.clone(),
                api_key: source.get_api_key(exchange),
                timeout: Duration::from_secs(source.timeout_secs),
            })
            .collect()
    }
}

impl SourceSection {
    /// Get API key with environment variable fallback
    /// Checks SCANNER_<EXCHANGE>_API_KEY env var if config value is empty/None
    pub fn get_api_key(&self, exchange: &str) -> Option<String> {
        if let Some(ref key) = self.api_key {
            if !key.is_empty() {
                return Some(key.clone());
            }
        }
        std::env::var(format!("SCANNER_{}_API_KEY", exchange.to_uppercase())).ok()
    }
}
