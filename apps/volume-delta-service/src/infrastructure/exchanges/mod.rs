//! Exchange Adapters
//!
//! Everything needed to turn exchange WebSocket streams into normalized
//! trades: per-exchange codecs, the reconnecting feed client and its shared
//! connection state.

mod binance;
mod bybit;
mod client;
mod codec;
mod reconnect;
mod state;

pub use binance::BinanceCodec;
pub use bybit::BybitCodec;
pub use client::{FeedClient, FeedClientConfig, FeedClientError};
pub use codec::{CodecError, TradeCodec, codec_for};
pub use reconnect::{ReconnectConfig, ReconnectError, ReconnectPolicy};
pub use state::{ConnectionState, FeedState, FeedStatus};
