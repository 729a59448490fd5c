//! Configuration for managers and the logging setup.
//!
//! Everything here can be loaded from a TOML file; missing keys fall back to
//! their defaults.

use crate::component::ComponentName;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

fn default_log_level() -> String {
    "info".to_string()
}

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentSystemConfig {
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
    /// Settings applied to managers built from this configuration
    #[serde(default)]
    pub manager: ManagerConfig,
}

/// Per-manager settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Name under which the manager lists itself as one of its own components
    pub own_name: Option<String>,
    /// Event names that are dispatched without the per-broadcast debug log
    pub quiet_events: Vec<String>,
    /// Event name prefixes that are dispatched without the per-broadcast debug log
    pub quiet_prefixes: Vec<String>,
}

impl ManagerConfig {
    pub fn with_own_name(mut self, own_name: impl Into<ComponentName>) -> Self {
        self.own_name = Some(own_name.into().to_string());
        self
    }

    pub fn with_quiet_event(mut self, event_name: impl Into<String>) -> Self {
        self.quiet_events.push(event_name.into());
        self
    }

    pub fn with_quiet_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.quiet_prefixes.push(prefix.into());
        self
    }

    /// Whether broadcasts of `event_name` skip the debug log
    pub fn is_quiet(&self, event_name: &str) -> bool {
        self.quiet_events.iter().any(|name| name == event_name)
            || self
                .quiet_prefixes
                .iter()
                .any(|prefix| event_name.starts_with(prefix.as_str()))
    }
}

/// Logging system configuration.
///
/// Controls log output format, levels, and destination settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
    /// Optional file path for log output (None means stdout only)
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
            file_path: None,
        }
    }
}

impl ComponentSystemConfig {
    /// Parse a configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Loads configuration from a TOML file.
    ///
    /// If the file does not exist, a default configuration is written to
    /// `path` and returned.
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            tokio::fs::write(path, content).await?;
            info!("📝 Created default config file at {}", path.display());
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config = Self::from_toml_str(&content)?;
        info!("📋 Loaded configuration from {}", path.display());
        Ok(config)
    }
}
