//! Search and cache configuration with sensible defaults.
//!
//! [`SearchConfig`] controls concurrency, per-plugin timeouts, result
//! caching and the built-in channel sources. [`CacheConfig`] bounds the
//! in-memory result cache. Both deserialise from partial TOML/JSON with
//! missing fields falling back to their defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SearchError;

/// Extension key carrying a per-request plugin timeout in milliseconds.
pub const PLUGIN_TIMEOUT_EXT_KEY: &str = "plugin_timeout_ms";

/// Configuration for the search orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Concurrency used when a request carries no override.
    pub default_concurrency: usize,
    /// Upper bound applied to any effective concurrency value.
    pub max_concurrency: usize,
    /// Per-plugin timeout in milliseconds, unless overridden per request.
    pub plugin_timeout_ms: u64,
    /// Whether assembled results are written to the cache.
    pub cache_enabled: bool,
    /// How long cached results stay valid, in seconds.
    pub cache_ttl_seconds: u64,
    /// Drop results that do not mention every keyword term, for sources
    /// that do not opt out via `skip_service_filter`.
    pub keyword_filter: bool,
    /// Telegram channels registered as sources at startup.
    pub default_channels: Vec<String>,
    /// HTTP request timeout for built-in sources, in seconds.
    pub request_timeout_seconds: u64,
    /// Custom User-Agent string. If `None`, rotates through a built-in list
    /// of realistic browser User-Agents.
    pub user_agent: Option<String>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_concurrency: 10,
            max_concurrency: 20,
            plugin_timeout_ms: 30_000,
            cache_enabled: true,
            cache_ttl_seconds: 3600,
            keyword_filter: false,
            default_channels: vec!["tgsearchers3".into()],
            request_timeout_seconds: 10,
            user_agent: None,
        }
    }
}

impl SearchConfig {
    /// Validates this configuration, returning an error if any field is invalid.
    ///
    /// Checks:
    /// - `default_concurrency` and `max_concurrency` must be greater than 0
    /// - `plugin_timeout_ms` must be greater than 0
    /// - `request_timeout_seconds` must be greater than 0
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.default_concurrency == 0 {
            return Err(SearchError::Config(
                "default_concurrency must be greater than 0".into(),
            ));
        }
        if self.max_concurrency == 0 {
            return Err(SearchError::Config(
                "max_concurrency must be greater than 0".into(),
            ));
        }
        if self.plugin_timeout_ms == 0 {
            return Err(SearchError::Config(
                "plugin_timeout_ms must be greater than 0".into(),
            ));
        }
        if self.request_timeout_seconds == 0 {
            return Err(SearchError::Config(
                "request_timeout_seconds must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    /// Default per-plugin timeout.
    pub fn plugin_timeout(&self) -> Duration {
        Duration::from_millis(self.plugin_timeout_ms)
    }

    /// Cache time-to-live.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    /// Resolve the concurrency for one request, clamped to
    /// `1..=max_concurrency`.
    pub fn effective_concurrency(&self, requested: Option<usize>) -> usize {
        requested
            .filter(|c| *c > 0)
            .unwrap_or(self.default_concurrency)
            .clamp(1, self.max_concurrency.max(1))
    }
}

/// Bounds for the in-memory result cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries.
    pub max_items: usize,
    /// Maximum approximate memory held by entries, in bytes.
    pub max_memory_bytes: usize,
    /// Minimum seconds between opportunistic cleanup passes.
    pub cleanup_interval_seconds: u64,
    /// Fraction of `max_memory_bytes` above which a cleanup pass frees
    /// about a tenth of current usage.
    pub memory_threshold: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_items: 1000,
            max_memory_bytes: 100 * 1024 * 1024,
            cleanup_interval_seconds: 300,
            memory_threshold: 0.8,
        }
    }
}

impl CacheConfig {
    /// Validates this configuration.
    pub fn validate(&self) -> Result<(), SearchError> {
        if self.max_items == 0 {
            return Err(SearchError::Config("max_items must be greater than 0".into()));
        }
        if self.max_memory_bytes == 0 {
            return Err(SearchError::Config(
                "max_memory_bytes must be greater than 0".into(),
            ));
        }
        if !(self.memory_threshold > 0.0 && self.memory_threshold <= 1.0) {
            return Err(SearchError::Config(
                "memory_threshold must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }

    /// Minimum interval between opportunistic cleanup passes.
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_seconds)
    }
}
