//! Configuration types for the Bronn core
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main Bronn configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BronnConfig {
    /// Snapshot store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Audit router settings
    #[serde(default)]
    pub audit: AuditConfig,

    /// Suppression ledger settings
    #[serde(default)]
    pub suppression: SuppressionConfig,
}

impl BronnConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.store.validate()?;
        self.audit.validate()?;
        self.suppression.validate()?;
        Ok(())
    }
}

/// Snapshot store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// File-based store
    File {
        /// Path to the store file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store registered by the embedder
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } => {
                if path.is_empty() {
                    return Err(crate::Error::config("File store path cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom store factory cannot be empty"));
                }
                Ok(())
            }
            StoreConfig::Memory => Ok(()),
        }
    }

    /// Registry name of the store type
    pub fn type_name(&self) -> &str {
        match self {
            StoreConfig::File { .. } => "file",
            StoreConfig::Memory => "memory",
            StoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Audit router configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Maximum rendered body length, in characters
    #[serde(default = "default_max_body_chars")]
    pub max_body_chars: usize,

    /// Marker appended to a truncated body
    #[serde(default = "default_truncation_marker")]
    pub truncation_marker: String,

    /// How long a raw message edit waits for the cached edit to log first
    /// (in milliseconds)
    #[serde(default = "default_edit_grace_millis")]
    pub edit_grace_millis: u64,
}

impl AuditConfig {
    /// Validate the audit configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.truncation_marker.chars().count() >= self.max_body_chars {
            return Err(crate::Error::config(
                "Truncation marker must be shorter than max_body_chars",
            ));
        }
        Ok(())
    }

    /// Grace period as a duration
    pub fn edit_grace(&self) -> Duration {
        Duration::from_millis(self.edit_grace_millis)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            max_body_chars: default_max_body_chars(),
            truncation_marker: default_truncation_marker(),
            edit_grace_millis: default_edit_grace_millis(),
        }
    }
}

/// Suppression ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionConfig {
    /// How long an armed entry waits for its echo event (in seconds)
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval of the background expiry sweep (in seconds)
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl SuppressionConfig {
    /// Validate the suppression configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.ttl_secs == 0 {
            return Err(crate::Error::config("Suppression TTL must be > 0"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(crate::Error::config("Suppression sweep interval must be > 0"));
        }
        Ok(())
    }

    /// Entry lifetime as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval as a duration
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for SuppressionConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_max_body_chars() -> usize {
    4096
}

fn default_truncation_marker() -> String {
    "...".to_string()
}

fn default_edit_grace_millis() -> u64 {
    1000
}

fn default_ttl_secs() -> u64 {
    30
}

fn default_sweep_interval_secs() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = BronnConfig::new();
        config.validate().unwrap();
        assert_eq!(config.audit.max_body_chars, 4096);
        assert_eq!(config.suppression.ttl(), Duration::from_secs(30));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: BronnConfig = serde_json::from_value(serde_json::json!({
            "store": {"type": "file", "path": "/tmp/guilds.json"},
            "suppression": {"ttl_secs": 5}
        }))
        .unwrap();

        assert_eq!(config.store.type_name(), "file");
        assert_eq!(config.suppression.ttl_secs, 5);
        assert_eq!(config.suppression.sweep_interval_secs, 60);
        assert_eq!(config.audit.truncation_marker, "...");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = BronnConfig::new();
        config.store = StoreConfig::File {
            path: String::new(),
        };
        assert!(config.validate().is_err());

        let mut config = BronnConfig::new();
        config.suppression.ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = BronnConfig::new();
        config.audit.max_body_chars = 2;
        assert!(config.validate().is_err());
    }
}
