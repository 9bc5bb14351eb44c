//! Runtime configuration.
//!
//! Values come from an optional TOML file overlaid with `A3S_SUGGEST_*`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::aggregator::AggregatorOptions;
use crate::catalog::SeedData;
use crate::fetcher_http::DEFAULT_USER_AGENT;
use crate::query::QueryOptions;
use crate::{Result, SuggestError};

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "A3S_SUGGEST_";

/// Configuration of the suggestion service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuggestConfig {
    /// Quiet period before a suggestion round starts.
    pub debounce_ms: u64,
    /// Suggestions kept per engine.
    pub max_results: usize,
    pub request_timeout_secs: u64,
    /// Minimum spacing between warm-ups of one engine.
    pub warmup_interval_secs: u64,
    pub user_agent: String,
    /// Catalog file; the CLI falls back to a file in the working directory.
    pub store_path: Option<PathBuf>,
    /// Upper bound on the serialized catalog size.
    pub storage_quota_bytes: Option<usize>,
    /// Replaces the built-in engines installed on first run.
    pub seed: Option<SeedData>,
}

impl Default for SuggestConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            max_results: 3,
            request_timeout_secs: 10,
            warmup_interval_secs: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            store_path: None,
            storage_quota_bytes: None,
            seed: None,
        }
    }
}

impl SuggestConfig {
    /// Loads `path` with environment overrides, then validates.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(SuggestError::Config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Self::extract(
            Figment::new()
                .merge(Toml::file(path))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Defaults with environment overrides, then validates.
    pub fn from_env() -> Result<Self> {
        Self::extract(Figment::new().merge(Env::prefixed(ENV_PREFIX)))
    }

    /// Parses a TOML string without environment overrides.
    pub fn from_toml_str(toml_str: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(toml_str).map_err(|e| SuggestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn extract(figment: Figment) -> Result<Self> {
        let config: Self = figment
            .extract()
            .map_err(|e| SuggestError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values that would disable suggestions entirely.
    pub fn validate(&self) -> Result<()> {
        if self.max_results == 0 {
            return Err(SuggestError::Config("max_results cannot be 0".to_string()));
        }
        if self.request_timeout_secs == 0 {
            return Err(SuggestError::Config(
                "request_timeout_secs cannot be 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Aggregator limits derived from this configuration.
    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            query: QueryOptions {
                max_results: self.max_results,
                request_timeout: self.request_timeout(),
                warmup_interval: Duration::from_secs(self.warmup_interval_secs),
            },
        }
    }

    /// Seed list for a fresh catalog.
    pub fn seed(&self) -> SeedData {
        self.seed.clone().unwrap_or_default()
    }
}
