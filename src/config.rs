//! Host configuration loaded from TOML.
//!
//! ```toml
//! [search]
//! default_concurrency = 10
//! plugin_timeout_ms = 30000
//! default_channels = ["tgsearchers3"]
//!
//! [cache]
//! max_items = 1000
//!
//! [breaker]
//! enabled = true
//! failure_threshold = 3
//! ```
//!
//! Every section and field is optional.

use std::path::{Path, PathBuf};

use panhub_search::{CacheConfig, CircuitBreakerConfig, SearchConfig};
use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};

/// Complete host configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Orchestrator settings.
    pub search: SearchConfig,
    /// Result cache bounds.
    pub cache: CacheConfig,
    /// Per-source circuit breaker, off unless enabled.
    pub breaker: CircuitBreakerConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, or
    /// fails validation.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| HostError::Config(format!("{}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, or defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Same as [`AppConfig::from_file`] for a file that exists.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            tracing::info!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content =
            toml::to_string_pretty(self).map_err(|e| HostError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns the first section's validation error.
    pub fn validate(&self) -> Result<()> {
        self.search.validate()?;
        self.cache.validate()?;
        Ok(())
    }

    /// Returns the default config file path: `~/.config/panhub/config.toml`.
    pub fn default_config_path() -> PathBuf {
        if let Some(config) = std::env::var_os("XDG_CONFIG_HOME") {
            PathBuf::from(config).join("panhub").join("config.toml")
        } else if let Some(home) = std::env::var_os("HOME") {
            PathBuf::from(home)
                .join(".config")
                .join("panhub")
                .join("config.toml")
        } else {
            PathBuf::from("panhub.toml")
        }
    }
}
