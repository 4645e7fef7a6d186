//! Agent Configuration
//!
//! Settings consumed by the probe pipeline, loaded from TOML with built-in
//! defaults for every field.
//!
//! ## Loading Order
//!
//! 1. `PROBE_RELAY_CONFIG` environment variable (path to TOML file)
//! 2. `probe_relay.toml` in the current working directory
//! 3. Built-in defaults
//!
//! After file loading, the two pipeline scalars can be overridden per-field
//! through `PROBE_RELAY_SEND_INTERVAL_MS` and
//! `PROBE_RELAY_RETENTION_LIMIT_BYTES`.

pub mod defaults;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Agent configuration for the probe pipeline and its transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Delivery cycle period in milliseconds
    pub send_interval_ms: u64,
    /// Retention queue cap in total payload bytes
    pub retention_limit_bytes: usize,
    /// Collector base URL
    pub collector_url: String,
    /// Bearer token sent with every collector call
    pub api_key: String,
    /// Instance identifier reported to the collector
    pub instance_id: String,
    /// Base64-encode payloads for text-safe transports
    pub text_encode: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            send_interval_ms: defaults::SEND_INTERVAL_MS,
            retention_limit_bytes: defaults::RETENTION_LIMIT_BYTES,
            collector_url: defaults::COLLECTOR_URL.to_string(),
            api_key: String::new(),
            instance_id: defaults::INSTANCE_ID.to_string(),
            text_encode: false,
        }
    }
}

impl AgentConfig {
    /// Load configuration using the standard search order:
    /// 1. `PROBE_RELAY_CONFIG` environment variable
    /// 2. `./probe_relay.toml` in the current working directory
    /// 3. Built-in defaults
    ///
    /// Env-var field overrides apply on top of whichever source was used.
    pub fn load() -> Self {
        let mut config = Self::load_file_or_defaults();
        config.apply_env_overrides();
        config.validate();
        config
    }

    fn load_file_or_defaults() -> Self {
        if let Ok(path) = std::env::var("PROBE_RELAY_CONFIG") {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded agent config from PROBE_RELAY_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from PROBE_RELAY_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "PROBE_RELAY_CONFIG points to non-existent file, falling back");
            }
        }

        let local = Path::new("probe_relay.toml");
        if local.exists() {
            match Self::load_from_file(local) {
                Ok(config) => {
                    info!(path = %local.display(), "Loaded agent config from working directory");
                    return config;
                }
                Err(e) => {
                    warn!(path = %local.display(), error = %e, "Failed to load local config, using defaults");
                }
            }
        }

        Self::default()
    }

    /// Load and parse a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("PROBE_RELAY_SEND_INTERVAL_MS") {
            match raw.parse::<u64>() {
                Ok(value) => self.send_interval_ms = value,
                Err(_) => warn!(value = %raw, "Invalid PROBE_RELAY_SEND_INTERVAL_MS — ignoring"),
            }
        }
        if let Ok(raw) = std::env::var("PROBE_RELAY_RETENTION_LIMIT_BYTES") {
            match raw.parse::<usize>() {
                Ok(value) => self.retention_limit_bytes = value,
                Err(_) => warn!(value = %raw, "Invalid PROBE_RELAY_RETENTION_LIMIT_BYTES — ignoring"),
            }
        }
        if let Ok(url) = std::env::var("PROBE_RELAY_COLLECTOR_URL") {
            self.collector_url = url;
        }
        if let Ok(key) = std::env::var("PROBE_RELAY_API_KEY") {
            self.api_key = key;
        }
    }

    /// Clamp values the pipeline cannot operate with.
    fn validate(&mut self) {
        if self.send_interval_ms == 0 {
            warn!(
                default_ms = defaults::SEND_INTERVAL_MS,
                "send_interval_ms of 0 is not usable — using default"
            );
            self.send_interval_ms = defaults::SEND_INTERVAL_MS;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.send_interval_ms, defaults::SEND_INTERVAL_MS);
        assert_eq!(config.retention_limit_bytes, defaults::RETENTION_LIMIT_BYTES);
        assert!(!config.text_encode);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: AgentConfig =
            toml::from_str("send_interval_ms = 500\ncollector_url = \"https://collector:9000\"")
                .unwrap();
        assert_eq!(config.send_interval_ms, 500);
        assert_eq!(config.collector_url, "https://collector:9000");
        assert_eq!(config.retention_limit_bytes, defaults::RETENTION_LIMIT_BYTES);
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("probe_relay.toml");
        std::fs::write(&path, "retention_limit_bytes = 4096\ntext_encode = true\n").unwrap();

        let config = AgentConfig::load_from_file(&path).unwrap();
        assert_eq!(config.retention_limit_bytes, 4096);
        assert!(config.text_encode);
    }

    #[test]
    fn test_load_from_file_rejects_bad_toml() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.toml");
        std::fs::write(&path, "send_interval_ms = \"soon\"").unwrap();

        assert!(AgentConfig::load_from_file(&path).is_err());
    }

    #[test]
    fn test_zero_interval_clamped() {
        let mut config = AgentConfig {
            send_interval_ms: 0,
            ..AgentConfig::default()
        };
        config.validate();
        assert_eq!(config.send_interval_ms, defaults::SEND_INTERVAL_MS);
    }
}
