//! Service Configuration Settings
//!
//! Configuration types for the volume delta service, loaded from environment
//! variables.

use std::time::Duration;

use crate::domain::interval::Interval;
use crate::domain::market::{Source, Symbol};

/// Supported exchange feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exchange {
    /// Bybit USDT perpetuals (v5 public linear stream).
    Bybit,
    /// Binance USD-M futures.
    Binance,
}

impl Exchange {
    /// Get the exchange name (also the [`Source`] identifier).
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bybit => "bybit",
            Self::Binance => "binance",
        }
    }

    /// Source identifier trades from this exchange are tagged with.
    #[must_use]
    pub fn source(&self) -> Source {
        Source::new(self.as_str())
    }

    const fn env_prefix(self) -> &'static str {
        match self {
            Self::Bybit => "VOLUME_DELTA_BYBIT",
            Self::Binance => "VOLUME_DELTA_BINANCE",
        }
    }

    const fn default_ws_url(self) -> &'static str {
        match self {
            Self::Bybit => "wss://stream.bybit.com/v5/public/linear",
            Self::Binance => "wss://fstream.binance.com/stream",
        }
    }
}

/// Where computed deltas are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkKind {
    /// One log line per delta.
    Log,
    /// Latest delta per (source, symbol, interval), served over HTTP.
    Cache,
    /// In-process broadcast channel.
    Broadcast,
}

impl SinkKind {
    /// Parse sink kind from string.
    #[must_use]
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "log" | "logging" => Some(Self::Log),
            "cache" => Some(Self::Cache),
            "broadcast" => Some(Self::Broadcast),
            _ => None,
        }
    }

    /// Get the sink name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Cache => "cache",
            Self::Broadcast => "broadcast",
        }
    }
}

/// Volume accounting settings.
#[derive(Debug, Clone)]
pub struct AccountingSettings {
    /// Intervals to accumulate and flush.
    pub intervals: Vec<Interval>,
    /// Capacity of the feed to accumulator trade channel.
    pub trade_channel_capacity: usize,
    /// Flush every interval one last time on shutdown.
    pub flush_on_shutdown: bool,
}

impl Default for AccountingSettings {
    fn default() -> Self {
        Self {
            intervals: Interval::all().to_vec(),
            trade_channel_capacity: 65_536,
            flush_on_shutdown: false,
        }
    }
}

/// One exchange feed to connect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSettings {
    /// Exchange the feed belongs to.
    pub exchange: Exchange,
    /// WebSocket endpoint.
    pub ws_url: String,
    /// Symbols to track, as the exchange spells them.
    pub symbols: Vec<Symbol>,
}

impl FeedSettings {
    /// Check whether the feed has anything to track.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        !self.symbols.is_empty()
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Application-level ping interval (used by feeds that require one).
    pub heartbeat_interval: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(20),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Delta sink settings.
#[derive(Debug, Clone)]
pub struct SinkSettings {
    /// Sinks every delta is sent to.
    pub kinds: Vec<SinkKind>,
    /// Capacity of the broadcast sink channel.
    pub broadcast_capacity: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            kinds: vec![SinkKind::Log, SinkKind::Cache],
            broadcast_capacity: 1024,
        }
    }
}

impl SinkSettings {
    /// Check whether a sink kind is enabled.
    #[must_use]
    pub fn has(&self, kind: SinkKind) -> bool {
        self.kinds.contains(&kind)
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Volume accounting settings.
    pub accounting: AccountingSettings,
    /// Exchange feeds, one per supported exchange.
    pub feeds: Vec<FeedSettings>,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Delta sink settings.
    pub sinks: SinkSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl ServiceConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval or sink lists cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Returns an error if the interval or sink lists cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(&lookup);

        let accounting = AccountingSettings {
            intervals: parse_intervals(&env, "VOLUME_DELTA_INTERVALS")?,
            trade_channel_capacity: env.parse_or(
                "VOLUME_DELTA_TRADE_CHANNEL_CAPACITY",
                AccountingSettings::default().trade_channel_capacity,
            ),
            flush_on_shutdown: env.parse_bool(
                "VOLUME_DELTA_FLUSH_ON_SHUTDOWN",
                AccountingSettings::default().flush_on_shutdown,
            ),
        };

        let feeds = [Exchange::Bybit, Exchange::Binance]
            .into_iter()
            .map(|exchange| {
                let prefix = exchange.env_prefix();
                FeedSettings {
                    exchange,
                    ws_url: env
                        .get(&format!("{prefix}_WS_URL"))
                        .unwrap_or_else(|| exchange.default_ws_url().to_string()),
                    symbols: parse_symbols(&env, &format!("{prefix}_SYMBOLS")),
                }
            })
            .collect();

        let defaults = WebSocketSettings::default();
        let websocket = WebSocketSettings {
            heartbeat_interval: env.duration_secs(
                "VOLUME_DELTA_HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval,
            ),
            reconnect_delay_initial: env.duration_millis(
                "VOLUME_DELTA_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "VOLUME_DELTA_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse_or(
                "VOLUME_DELTA_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse_or(
                "VOLUME_DELTA_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
        };

        let sinks = SinkSettings {
            kinds: parse_sinks(&env, "VOLUME_DELTA_SINKS")?,
            broadcast_capacity: env.parse_or(
                "VOLUME_DELTA_BROADCAST_CAPACITY",
                SinkSettings::default().broadcast_capacity,
            ),
        };

        let server = ServerSettings {
            health_port: env.parse_or(
                "VOLUME_DELTA_HEALTH_PORT",
                ServerSettings::default().health_port,
            ),
        };

        Ok(Self {
            accounting,
            feeds,
            websocket,
            sinks,
            server,
        })
    }

    /// Feeds that have at least one symbol configured.
    pub fn enabled_feeds(&self) -> impl Iterator<Item = &FeedSettings> {
        self.feeds.iter().filter(|feed| feed.is_enabled())
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable could not be parsed.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        reason: String,
    },
}

// =============================================================================
// Parsing Helpers
// =============================================================================

struct Env<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Env<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse_or<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn parse_bool(&self, key: &str, default: bool) -> bool {
        self.get(key)
            .map_or(default, |v| match v.trim().to_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => default,
            })
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_intervals(env: &Env<'_>, key: &str) -> Result<Vec<Interval>, ConfigError> {
    let Some(value) = env.get(key) else {
        return Ok(AccountingSettings::default().intervals);
    };

    let mut intervals = split_list(&value)
        .map(str::parse::<Interval>)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

    if intervals.is_empty() {
        return Err(ConfigError::EmptyValue(key.to_string()));
    }

    intervals.sort_unstable();
    intervals.dedup();
    Ok(intervals)
}

fn parse_sinks(env: &Env<'_>, key: &str) -> Result<Vec<SinkKind>, ConfigError> {
    let Some(value) = env.get(key) else {
        return Ok(SinkSettings::default().kinds);
    };

    let mut kinds = Vec::new();
    for name in split_list(&value) {
        let kind = SinkKind::from_str_case_insensitive(name).ok_or_else(|| {
            ConfigError::InvalidValue {
                key: key.to_string(),
                reason: format!("unknown sink {name:?} (expected log, cache or broadcast)"),
            }
        })?;
        if !kinds.contains(&kind) {
            kinds.push(kind);
        }
    }

    if kinds.is_empty() {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            reason: "at least one sink is required".to_string(),
        });
    }

    Ok(kinds)
}

fn parse_symbols(env: &Env<'_>, key: &str) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = env
        .get(key)
        .map(|value| split_list(&value).map(|s| Symbol::new(s.to_uppercase())).collect())
        .unwrap_or_default();
    symbols.sort();
    symbols.dedup();
    symbols
}
