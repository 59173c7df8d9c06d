//! Bus configuration
//!
//! TOML-backed configuration for the broker connection, circuit breaker,
//! gateway, and health thresholds. Credentials are referenced by environment
//! variable name, never stored inline.

use crate::breaker::BreakerConfig;
use crate::gateway::GatewayConfig;
use crate::health::HealthConfig;
use crate::protocol::{ChannelBuilder, EncoderStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Top-level bus configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusConfig {
    pub broker: BrokerSection,
    #[serde(default)]
    pub breaker: BreakerSection,
    #[serde(default)]
    pub gateway: GatewaySection,
    #[serde(default)]
    pub health: HealthSection,
    /// Wire serializer strategy, selected once at startup
    #[serde(default)]
    pub encoder: EncoderStrategy,
}

/// Broker connection settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BrokerSection {
    /// Broker URL with protocol and port (mqtt:// or mqtts://)
    pub url: String,
    /// Environment variable containing username
    pub username_env: Option<String>,
    /// Environment variable containing password
    pub password_env: Option<String>,
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BreakerSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    30
}

impl Default for BreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

/// Gateway settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewaySection {
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
    #[serde(default = "default_ping_timeout_ms")]
    pub ping_timeout_ms: u64,
}

fn default_channel_prefix() -> String {
    "bus/events".to_string()
}

fn default_publish_timeout_ms() -> u64 {
    5000
}

fn default_ping_timeout_ms() -> u64 {
    2000
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            channel_prefix: default_channel_prefix(),
            publish_timeout_ms: default_publish_timeout_ms(),
            ping_timeout_ms: default_ping_timeout_ms(),
        }
    }
}

/// Health classification thresholds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HealthSection {
    #[serde(default = "default_degraded_latency_ms")]
    pub degraded_latency_ms: u64,
    #[serde(default = "default_degraded_failure_rate")]
    pub degraded_failure_rate: f64,
}

fn default_degraded_latency_ms() -> u64 {
    50
}

fn default_degraded_failure_rate() -> f64 {
    0.05
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            degraded_latency_ms: default_degraded_latency_ms(),
            degraded_failure_rate: default_degraded_failure_rate(),
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

impl BusConfig {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: BusConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.url.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "broker.url must be non-empty".to_string(),
            ));
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidConfig(
                "breaker.failure_threshold must be greater than 0".to_string(),
            ));
        }
        if self.breaker.cooldown_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "breaker.cooldown_secs must be greater than 0".to_string(),
            ));
        }
        // Blank credential env values are caught when the broker client
        // resolves them; blank env *names* are a config authoring mistake.
        for (field, env_name) in [
            ("broker.username_env", &self.broker.username_env),
            ("broker.password_env", &self.broker.password_env),
        ] {
            if let Some(name) = env_name {
                if name.trim().is_empty() {
                    return Err(ConfigError::InvalidConfig(format!(
                        "{field} must name an environment variable"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Breaker tuning derived from this config
    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.breaker.failure_threshold,
            cooldown: Duration::from_secs(self.breaker.cooldown_secs),
        }
    }

    /// Gateway tuning derived from this config
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            channel_prefix: self.gateway.channel_prefix.clone(),
            publish_timeout: Duration::from_millis(self.gateway.publish_timeout_ms),
            ping_timeout: Duration::from_millis(self.gateway.ping_timeout_ms),
            encoder: self.encoder,
        }
    }

    /// Reserved probe channel under the configured prefix, for wiring the
    /// broker client's health pings
    pub fn probe_channel(&self) -> String {
        ChannelBuilder::probe_channel(&self.gateway.channel_prefix)
    }

    /// Health thresholds derived from this config
    pub fn health_config(&self) -> HealthConfig {
        HealthConfig {
            degraded_latency_ms: self.health.degraded_latency_ms,
            degraded_failure_rate: self.health.degraded_failure_rate,
        }
    }
}
