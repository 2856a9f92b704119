//! Engine Configuration Settings
//!
//! Configuration types for the pairs engine, loaded from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::application::services::SupervisorConfig;
use crate::domain::tick::{Symbol, normalize_symbol};
use crate::infrastructure::binance::{
    BinanceConnectorConfig, DEFAULT_STREAM_URL, HeartbeatConfig, ReconnectConfig,
};

const DEFAULT_SYMBOLS: &str = "btcusdt,ethusdt";
const DEFAULT_DB_PATH: &str = "data/ticks.db";

/// Feed connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSettings {
    /// Base WebSocket URL; streams are opened at `<url>/<symbol>@trade`.
    pub url: String,
    /// Bound on a single connection attempt.
    pub connect_timeout: Duration,
    /// Idle time before a heartbeat ping.
    pub heartbeat_interval: Duration,
    /// Time allowed for a reply after a ping.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Jitter as a fraction of the delay.
    pub reconnect_jitter: f64,
    /// How long shutdown waits for connections to wind down.
    pub shutdown_grace: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_STREAM_URL.to_string(),
            connect_timeout: Duration::from_secs(10),
            heartbeat_interval: Duration::from_secs(15),
            heartbeat_timeout: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_millis(1000),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            reconnect_jitter: 0.0,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

impl FeedSettings {
    /// Reject timings that would stall the feed or spin the reconnect loop.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] naming the offending variable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (
                self.connect_timeout.is_zero(),
                "PAIRS_CONNECT_TIMEOUT_SECS",
                "must be positive",
            ),
            (
                self.heartbeat_interval.is_zero(),
                "PAIRS_HEARTBEAT_INTERVAL_SECS",
                "must be positive",
            ),
            (
                self.heartbeat_timeout.is_zero(),
                "PAIRS_HEARTBEAT_TIMEOUT_SECS",
                "must be positive",
            ),
            (
                self.reconnect_delay_initial.is_zero(),
                "PAIRS_RECONNECT_DELAY_INITIAL_MS",
                "must be positive",
            ),
            (
                self.reconnect_delay_max < self.reconnect_delay_initial,
                "PAIRS_RECONNECT_DELAY_MAX_SECS",
                "must not be below the initial delay",
            ),
            (
                !(self.reconnect_delay_multiplier.is_finite()
                    && self.reconnect_delay_multiplier >= 1.0),
                "PAIRS_RECONNECT_DELAY_MULTIPLIER",
                "must be finite and at least 1",
            ),
            (
                !(0.0..=1.0).contains(&self.reconnect_jitter),
                "PAIRS_RECONNECT_JITTER",
                "must be between 0 and 1",
            ),
        ];

        match checks.into_iter().find(|(failed, _, _)| *failed) {
            Some((_, key, reason)) => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                reason,
            }),
            None => Ok(()),
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check HTTP port (0 = disabled).
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Symbols to ingest, normalized and deduplicated.
    pub symbols: Vec<Symbol>,
    /// SQLite database file.
    pub db_path: PathBuf,
    /// Feed connection settings.
    pub feed: FeedSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl EngineConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if `PAIRS_SYMBOLS` names no symbols or a timing
    /// setting is out of range.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns an error if `PAIRS_SYMBOLS` names no symbols or a timing
    /// setting is out of range.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let raw_symbols = lookup("PAIRS_SYMBOLS").unwrap_or_else(|| DEFAULT_SYMBOLS.to_string());
        let symbols = parse_symbols(&raw_symbols);
        if symbols.is_empty() {
            return Err(ConfigError::EmptyValue("PAIRS_SYMBOLS".to_string()));
        }

        let db_path = lookup("PAIRS_DB_PATH")
            .filter(|p| !p.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_DB_PATH), PathBuf::from);

        let defaults = FeedSettings::default();
        let feed = FeedSettings {
            url: lookup("PAIRS_FEED_URL")
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(defaults.url),
            connect_timeout: parse_duration_secs(
                &lookup,
                "PAIRS_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
            heartbeat_interval: parse_duration_secs(
                &lookup,
                "PAIRS_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            heartbeat_timeout: parse_duration_secs(
                &lookup,
                "PAIRS_HEARTBEAT_TIMEOUT_SECS",
                defaults.heartbeat_timeout,
            ),
            reconnect_delay_initial: parse_duration_millis(
                &lookup,
                "PAIRS_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: parse_duration_secs(
                &lookup,
                "PAIRS_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: parse_number(
                &lookup,
                "PAIRS_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            reconnect_jitter: parse_number(
                &lookup,
                "PAIRS_RECONNECT_JITTER",
                defaults.reconnect_jitter,
            ),
            shutdown_grace: parse_duration_secs(
                &lookup,
                "PAIRS_SHUTDOWN_GRACE_SECS",
                defaults.shutdown_grace,
            ),
        };
        feed.validate()?;

        let server = ServerSettings {
            health_port: parse_number(
                &lookup,
                "PAIRS_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            symbols,
            db_path,
            feed,
            server,
        })
    }

    /// Supervisor settings derived from the feed settings.
    #[must_use]
    pub fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            connect_timeout: self.feed.connect_timeout,
            reconnect: ReconnectConfig::new(
                self.feed.reconnect_delay_initial,
                self.feed.reconnect_delay_max,
                self.feed.reconnect_delay_multiplier,
                self.feed.reconnect_jitter,
            ),
            shutdown_grace: self.feed.shutdown_grace,
        }
    }

    /// Connector settings derived from the feed settings.
    #[must_use]
    pub fn connector(&self) -> BinanceConnectorConfig {
        BinanceConnectorConfig {
            base_url: self.feed.url.clone(),
            heartbeat: HeartbeatConfig::new(
                self.feed.heartbeat_interval,
                self.feed.heartbeat_timeout,
            ),
        }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable parsed but is out of range.
    #[error("environment variable {key} {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What the value must satisfy.
        reason: &'static str,
    },
}

fn parse_symbols(raw: &str) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = raw
        .split(',')
        .map(normalize_symbol)
        .filter(|s| !s.is_empty())
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
}

fn parse_number<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_duration_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_duration_millis(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
