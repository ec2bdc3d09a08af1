//! Feed Connection State
//!
//! Shared, lock-light view of one feed's connection, updated by the feed
//! client and read by the health server.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::domain::market::Source;

/// Connection lifecycle of a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// Opening the WebSocket and subscribing.
    Connecting,
    /// Subscribed and receiving frames.
    Connected,
    /// Waiting before the next connection attempt.
    Reconnecting,
    /// Client has exited.
    Stopped,
}

/// Point-in-time snapshot of a feed, as reported by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedStatus {
    /// Feed source.
    pub source: Source,
    /// Connection state.
    pub state: ConnectionState,
    /// Trades decoded since startup.
    pub trades_received: u64,
    /// Reconnection attempts since the last successful connection.
    pub reconnect_attempts: u32,
    /// Time of the last successful connection.
    pub last_connected_at: Option<DateTime<Utc>>,
    /// Most recent connection error.
    pub last_error: Option<String>,
}

/// Connection state of one feed.
#[derive(Debug)]
pub struct FeedState {
    source: Source,
    state: RwLock<ConnectionState>,
    last_connected_at: RwLock<Option<DateTime<Utc>>>,
    last_error: RwLock<Option<String>>,
    trades_received: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl FeedState {
    /// Create state for a feed that has not connected yet.
    #[must_use]
    pub const fn new(source: Source) -> Self {
        Self {
            source,
            state: RwLock::new(ConnectionState::Connecting),
            last_connected_at: RwLock::new(None),
            last_error: RwLock::new(None),
            trades_received: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
        }
    }

    /// Set the connection state.
    pub fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
        if state == ConnectionState::Connected {
            *self.last_connected_at.write() = Some(Utc::now());
            *self.last_error.write() = None;
            self.reconnect_attempts.store(0, Ordering::Relaxed);
        }
    }

    /// Record a connection error; the feed is now waiting to reconnect.
    pub fn set_error(&self, message: String) {
        *self.state.write() = ConnectionState::Reconnecting;
        *self.last_error.write() = Some(message);
    }

    /// Count decoded trades.
    pub fn add_trades(&self, count: usize) {
        self.trades_received
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Count a reconnection attempt.
    pub fn increment_reconnect_attempts(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Feed source.
    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check whether the feed is connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Trades decoded since startup.
    #[must_use]
    pub fn trades_received(&self) -> u64 {
        self.trades_received.load(Ordering::Relaxed)
    }

    /// Reconnection attempts since the last successful connection.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    /// Take a snapshot.
    #[must_use]
    pub fn status(&self) -> FeedStatus {
        FeedStatus {
            source: self.source.clone(),
            state: self.state(),
            trades_received: self.trades_received(),
            reconnect_attempts: self.reconnect_attempts(),
            last_connected_at: *self.last_connected_at.read(),
            last_error: self.last_error.read().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn connecting_clears_error_and_attempts() {
        let state = FeedState::new(Source::new("bybit"));
        state.set_error("connection reset".to_string());
        state.increment_reconnect_attempts();
        state.increment_reconnect_attempts();

        assert_eq!(state.state(), ConnectionState::Reconnecting);
        assert_eq!(state.reconnect_attempts(), 2);

        state.set_state(ConnectionState::Connected);

        let status = state.status();
        assert!(state.is_connected());
        assert_eq!(status.reconnect_attempts, 0);
        assert!(status.last_error.is_none());
        assert!(status.last_connected_at.is_some());
    }

    #[test]
    fn status_serializes_lowercase_state() {
        let state = FeedState::new(Source::new("binance"));
        let json = serde_json::to_value(state.status()).unwrap();

        assert_eq!(json["source"], "binance");
        assert_eq!(json["state"], "connecting");
        assert_eq!(json["trades_received"], 0);
    }

    #[test]
    fn trade_counts_are_thread_safe() {
        let state = Arc::new(FeedState::new(Source::new("bybit")));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let state = Arc::clone(&state);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        state.add_trades(2);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(state.trades_received(), 16_000);
    }
}
