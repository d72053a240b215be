//! SFU Configuration

use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::logging::parse_log_level;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sfu: SfuConfig,
    pub snapshot: SnapshotConfig,
    pub redis: RedisConfig,
    pub logging: LoggingConfig,
}

/// SFU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    /// Try to load the native media engine at startup
    pub enable_media_engine: bool,
    /// Maximum number of concurrent rooms (0 = unlimited)
    pub max_rooms: usize,
    /// Maximum peers per room (0 = unlimited)
    pub max_peers_per_room: usize,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            enable_media_engine: true,
            max_rooms: 0,
            max_peers_per_room: 0,
        }
    }
}

/// Room snapshot persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotConfig {
    pub enabled: bool,
    /// Keys are written as `{key_prefix}:room:{room_id}:snapshot`
    pub key_prefix: String,
    pub ttl_seconds: u64,
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            key_prefix: "sfu".to_string(),
            ttl_seconds: 3600,
        }
    }
}

/// Redis connection; snapshots stay in process memory when no url is set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // HUDDLE_SFU__MAX_ROOMS, HUDDLE_REDIS__URL, ...
        builder = builder.add_source(
            Environment::with_prefix("HUDDLE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Reject values that deserialize but cannot be acted on
    pub fn validate(&self) -> crate::Result<()> {
        if let Err(e) = parse_log_level(&self.logging.level) {
            return Err(ConfigError::Message(e.to_string()).into());
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigError::Message(format!(
                "Invalid log format: {} (expected \"json\" or \"pretty\")",
                self.logging.format
            ))
            .into());
        }
        if self.snapshot.enabled && self.snapshot.ttl_seconds == 0 {
            return Err(ConfigError::Message("snapshot.ttl_seconds must be positive".to_string()).into());
        }
        Ok(())
    }
}
