//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! The Redis URL is wrapped in secrecy::SecretString since it may carry
//! credentials.

pub mod secrets;

use std::time::Duration;

use crate::error::{Error, Result};
use secrecy::{ExposeSecret, SecretString};

/// Stream name used when none is configured.
pub const DEFAULT_STREAM: &str = "default";

/// Consumer group name used when none is configured.
pub const DEFAULT_GROUP: &str = "default_consumer_group";

/// Settings for a single consumer instance. Read once at construction.
#[derive(Debug)]
pub struct ConsumerConfig {
    /// Expiry of a result entry in Redis.
    pub response_entry_timeout: Duration,
    /// Duration after which the consumer is considered dead if its
    /// heartbeat is not refreshed.
    pub keepalive_timeout: Duration,
    /// Redis url for streams and result entries.
    pub redis_url: SecretString,
    /// Redis stream name.
    pub redis_stream: String,
    /// Redis consumer group name.
    pub redis_group: String,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            response_entry_timeout: Duration::from_secs(60 * 60),
            keepalive_timeout: Duration::from_secs(5 * 60),
            redis_url: SecretString::from(String::new()),
            redis_stream: DEFAULT_STREAM.to_string(),
            redis_group: DEFAULT_GROUP.to_string(),
        }
    }
}

impl ConsumerConfig {
    /// Short timeouts suitable for tests. The URL is left empty.
    pub fn for_tests() -> Self {
        Self {
            response_entry_timeout: Duration::from_secs(60),
            keepalive_timeout: Duration::from_millis(30),
            ..Self::default()
        }
    }

    /// Load consumer settings from environment variables.
    ///
    /// `REDIS_URL` is required; everything else falls back to
    /// [`ConsumerConfig::default`].
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            response_entry_timeout: optional_duration(
                "RESPONSE_ENTRY_TIMEOUT_SECS",
                Duration::from_secs,
            )?
            .unwrap_or(defaults.response_entry_timeout),
            keepalive_timeout: optional_duration("KEEPALIVE_TIMEOUT_MS", Duration::from_millis)?
                .unwrap_or(defaults.keepalive_timeout),
            redis_url: SecretString::from(required_var("REDIS_URL")?),
            redis_stream: std::env::var("REDIS_STREAM").unwrap_or(defaults.redis_stream),
            redis_group: std::env::var("REDIS_GROUP").unwrap_or(defaults.redis_group),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the consumer cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.redis_url.expose_secret().is_empty() {
            return Err(Error::Config("redis url cannot be empty".to_string()));
        }
        if self.heartbeat_interval().is_zero() {
            return Err(Error::Config(format!(
                "keepalive timeout {:?} leaves no time between heartbeats",
                self.keepalive_timeout
            )));
        }
        if self.response_entry_timeout.is_zero() {
            return Err(Error::Config(
                "response entry timeout must be positive".to_string(),
            ));
        }
        if self.redis_stream.is_empty() || self.redis_group.is_empty() {
            return Err(Error::Config(
                "redis stream and group names cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval between heartbeat writes.
    pub fn heartbeat_interval(&self) -> Duration {
        self.keepalive_timeout / 10
    }

    /// Expiry of the heartbeat key.
    pub fn heartbeat_expiry(&self) -> Duration {
        self.keepalive_timeout * 2
    }
}

/// Process-level configuration for the `pubsub` binary.
#[derive(Debug)]
pub struct Config {
    pub consumer: ConsumerConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            consumer: ConsumerConfig::from_env()?,
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn optional_duration(name: &str, unit: fn(u64) -> Duration) -> Result<Option<Duration>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|n| Some(unit(n)))
            .map_err(|e| Error::Config(format!("invalid value {raw:?} for {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
