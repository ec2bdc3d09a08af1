//! Exchange Feed Client
//!
//! One WebSocket connection per exchange. The client subscribes to the
//! configured symbols' trade streams, decodes frames with the exchange's
//! [`TradeCodec`] and forwards every trade to the accumulator channel.
//!
//! Connection failures are retried with [`ReconnectPolicy`]. The client only
//! gives up when the reconnect budget is exhausted or the accumulator
//! channel has closed.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, TradeCodec, codec_for};
use super::reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
use super::state::{ConnectionState, FeedState};
use crate::domain::market::{Symbol, TradeEvent};
use crate::infrastructure::config::{FeedSettings, WebSocketSettings};
use crate::infrastructure::metrics;

/// Frames missed (in heartbeat intervals) before a connection is considered dead.
const STALE_AFTER_HEARTBEATS: u32 = 3;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the feed client.
#[derive(Debug, thiserror::Error)]
pub enum FeedClientError {
    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection closed by the server.
    #[error("connection closed")]
    ConnectionClosed,

    /// No frames received for too long.
    #[error("no frames received for {0:?}")]
    Stale(Duration),

    /// The accumulator channel is closed.
    #[error("trade channel closed")]
    ChannelClosed,

    /// Reconnect attempts exhausted.
    #[error(transparent)]
    Reconnect(#[from] ReconnectError),
}

// =============================================================================
// Feed Client
// =============================================================================

/// Configuration for a feed client.
#[derive(Debug, Clone)]
pub struct FeedClientConfig {
    /// WebSocket URL.
    pub url: String,
    /// Symbols to subscribe to.
    pub symbols: Vec<Symbol>,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
    /// Keepalive interval.
    pub heartbeat_interval: Duration,
}

impl FeedClientConfig {
    /// Build the client configuration for one feed.
    #[must_use]
    pub fn new(feed: &FeedSettings, websocket: &WebSocketSettings) -> Self {
        Self {
            url: feed.ws_url.clone(),
            symbols: feed.symbols.clone(),
            reconnect: ReconnectConfig::from(websocket),
            heartbeat_interval: websocket.heartbeat_interval,
        }
    }
}

/// WebSocket client for one exchange's public trade stream.
pub struct FeedClient {
    config: FeedClientConfig,
    codec: Box<dyn TradeCodec>,
    trade_tx: mpsc::Sender<TradeEvent>,
    state: Arc<FeedState>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for FeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedClient")
            .field("source", self.state.source())
            .field("url", &self.config.url)
            .field("symbols", &self.config.symbols.len())
            .finish_non_exhaustive()
    }
}

impl FeedClient {
    /// Create a client for a configured feed.
    #[must_use]
    pub fn new(
        feed: &FeedSettings,
        websocket: &WebSocketSettings,
        trade_tx: mpsc::Sender<TradeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_codec(
            FeedClientConfig::new(feed, websocket),
            codec_for(feed.exchange),
            trade_tx,
            cancel,
        )
    }

    /// Create a client with an explicit configuration and codec.
    #[must_use]
    pub fn with_codec(
        config: FeedClientConfig,
        codec: Box<dyn TradeCodec>,
        trade_tx: mpsc::Sender<TradeEvent>,
        cancel: CancellationToken,
    ) -> Self {
        let state = Arc::new(FeedState::new(codec.source()));
        Self {
            config,
            codec,
            trade_tx,
            state,
            cancel,
        }
    }

    /// Shared connection state.
    #[must_use]
    pub fn state(&self) -> Arc<FeedState> {
        Arc::clone(&self.state)
    }

    /// Run the connection loop until cancelled or an unrecoverable error.
    ///
    /// # Errors
    ///
    /// Returns an error when reconnect attempts are exhausted or the trade
    /// channel has closed.
    pub async fn run(self: Arc<Self>) -> Result<(), FeedClientError> {
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());
        let source = self.state.source().clone();

        let result = loop {
            if self.cancel.is_cancelled() {
                break Ok(());
            }

            self.state.set_state(ConnectionState::Connecting);

            let error = match self.connect_and_run(&mut policy).await {
                Ok(()) => break Ok(()),
                Err(FeedClientError::ChannelClosed) => break Err(FeedClientError::ChannelClosed),
                Err(e) => e,
            };

            tracing::warn!(source = %source, error = %error, "Feed connection error");
            self.state.set_error(error.to_string());

            let delay = match policy.next_delay() {
                Ok(delay) => delay,
                Err(e) => break Err(e.into()),
            };

            self.state.increment_reconnect_attempts();
            metrics::record_reconnect(&source);
            tracing::info!(
                source = %source,
                attempt = policy.attempt_count(),
                delay_ms = delay.as_millis(),
                "Reconnecting to feed"
            );

            tokio::select! {
                () = self.cancel.cancelled() => break Ok(()),
                () = tokio::time::sleep(delay) => {}
            }
        };

        self.state.set_state(ConnectionState::Stopped);
        match &result {
            Ok(()) => tracing::info!(source = %source, "Feed client stopped"),
            Err(e) => tracing::error!(source = %source, error = %e, "Feed client gave up"),
        }
        result
    }

    /// Connect, subscribe and pump frames until error or cancellation.
    async fn connect_and_run(&self, policy: &mut ReconnectPolicy) -> Result<(), FeedClientError> {
        let source = self.state.source();
        tracing::info!(source = %source, url = %self.config.url, "Connecting to feed");

        let (ws_stream, _response) = tokio::select! {
            () = self.cancel.cancelled() => return Ok(()),
            connected = tokio_tungstenite::connect_async(self.config.url.as_str()) => connected?,
        };
        let (mut write, mut read) = ws_stream.split();

        for request in self.codec.subscribe_messages(&self.config.symbols) {
            write.send(Message::Text(request.into())).await?;
        }

        self.state.set_state(ConnectionState::Connected);
        policy.reset();
        tracing::info!(
            source = %source,
            symbols = self.config.symbols.len(),
            "Feed connected"
        );

        let heartbeat_every = self.config.heartbeat_interval;
        let stale_after = heartbeat_every * STALE_AFTER_HEARTBEATS;
        let mut heartbeat = tokio::time::interval_at(Instant::now() + heartbeat_every, heartbeat_every);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last_frame = Instant::now();

        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(());
                }
                _ = heartbeat.tick() => {
                    if last_frame.elapsed() > stale_after {
                        return Err(FeedClientError::Stale(last_frame.elapsed()));
                    }
                    let keepalive = self
                        .codec
                        .ping_message()
                        .map_or_else(|| Message::Ping(Vec::new().into()), |ping| Message::Text(ping.into()));
                    write.send(keepalive).await?;
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            last_frame = Instant::now();
                            self.handle_text(&text).await?;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            last_frame = Instant::now();
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Pong(_))) => {
                            last_frame = Instant::now();
                        }
                        Some(Ok(Message::Close(frame))) => {
                            tracing::info!(source = %source, frame = ?frame, "Server sent close frame");
                            return Err(FeedClientError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(FeedClientError::ConnectionClosed),
                    }
                }
            }
        }
    }

    /// Decode a text frame and forward its trades.
    async fn handle_text(&self, text: &str) -> Result<(), FeedClientError> {
        let trades = match self.codec.decode(text) {
            Ok(trades) => trades,
            Err(CodecError::Rejected(reason)) => {
                tracing::warn!(source = %self.state.source(), reason = %reason, "Exchange rejected request");
                return Ok(());
            }
            Err(e) => {
                tracing::debug!(source = %self.state.source(), error = %e, "Skipping undecodable frame");
                return Ok(());
            }
        };

        self.state.add_trades(trades.len());
        for trade in trades {
            self.trade_tx
                .send(trade)
                .await
                .map_err(|_| FeedClientError::ChannelClosed)?;
        }
        Ok(())
    }
}
