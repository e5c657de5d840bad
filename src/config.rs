//! Configuration for the reactor bridge
//!
//! Configuration is read from TOML. Every section has defaults, so an empty
//! file describes a client connecting to `localhost:1883` with a 1.5 second
//! maintenance interval and JSON logging.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Environment variable overriding `broker.host`
pub const BROKER_HOST_ENV: &str = "MQTT_BROKER_HOST";
/// Environment variable overriding `broker.port`
pub const BROKER_PORT_ENV: &str = "MQTT_BROKER_PORT";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BridgeConfig {
    #[serde(default)]
    pub adapter: AdapterSection,
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Socket adapter settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdapterSection {
    /// Period of the maintenance timer in milliseconds (default: 1500)
    #[serde(default = "default_maintenance_interval_ms")]
    pub maintenance_interval_ms: u64,
    /// Prefix the reactor uses when logging about the adapter
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
}

fn default_maintenance_interval_ms() -> u64 {
    1500
}

fn default_log_prefix() -> String {
    "mqtt_proxy".to_string()
}

impl Default for AdapterSection {
    fn default() -> Self {
        Self {
            maintenance_interval_ms: default_maintenance_interval_ms(),
            log_prefix: default_log_prefix(),
        }
    }
}

impl AdapterSection {
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    /// Settings with a custom maintenance interval
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            maintenance_interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
            ..Self::default()
        }
    }
}

/// Which primitive connect operation to use
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConnectMode {
    /// Connect immediately
    #[default]
    Blocking,
    /// Record parameters and let the primitive connect later
    Async,
    /// Find the broker through DNS SRV records
    Srv,
}

/// Broker connection parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// MQTT keepalive in seconds (default: 60)
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u16,
    /// Local address to bind the socket to; empty means any
    #[serde(default)]
    pub bind_address: String,
    #[serde(default)]
    pub mode: ConnectMode,
    /// Domain for SRV lookup; `None` lets the primitive pick its local domain
    pub srv_domain: Option<String>,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    1883
}

fn default_keepalive() -> u16 {
    60
}

impl Default for BrokerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            keepalive_secs: default_keepalive(),
            bind_address: String::new(),
            mode: ConnectMode::default(),
            srv_domain: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub include_spans: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            include_spans: false,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl BridgeConfig {
    /// Load configuration from a TOML file, apply environment overrides and validate
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text, apply environment overrides and validate
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let mut config: BridgeConfig = toml::from_str(content)?;
        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply broker overrides from a variable lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(BROKER_HOST_ENV) {
            self.broker.host = host;
        }
        if let Some(port) = lookup(BROKER_PORT_ENV) {
            self.broker.port = port.trim().parse().map_err(|_| {
                ConfigError::InvalidConfig(format!("{BROKER_PORT_ENV}='{port}' is not a valid port"))
            })?;
        }
        Ok(())
    }

    /// Check value ranges and cross-field consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.adapter.maintenance_interval_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "adapter.maintenance_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.adapter.log_prefix.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "adapter.log_prefix must not be empty".to_string(),
            ));
        }
        if self.broker.port == 0 {
            return Err(ConfigError::InvalidConfig(
                "broker.port must be greater than 0".to_string(),
            ));
        }
        if self.broker.mode != ConnectMode::Srv && self.broker.host.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.host is required unless broker.mode = \"srv\"".to_string(),
            ));
        }
        Ok(())
    }
}
