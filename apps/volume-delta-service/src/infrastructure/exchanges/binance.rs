//! Binance USD-M Futures Aggregate Trade Stream
//!
//! # Protocol
//!
//! Connected to the combined stream endpoint (`/stream`), the client
//! subscribes with
//! `{"method":"SUBSCRIBE","params":["btcusdt@aggTrade", ...],"id":1}`.
//! Events arrive wrapped with their stream name:
//!
//! ```json
//! {"stream":"btcusdt@aggTrade",
//!  "data":{"e":"aggTrade","E":123456789,"s":"BTCUSDT","a":5933014,
//!          "p":"0.001","q":"100","f":100,"l":105,"T":123456785,"m":true}}
//! ```
//!
//! `m` is true when the buyer was the maker, i.e. the aggressor sold.
//! The server pings with WebSocket control frames; no application-level
//! keepalive is needed.

use serde::Deserialize;

use super::codec::{CodecError, TradeCodec, parse_quantity};
use crate::domain::market::{Side, Source, Symbol, TradeEvent};
use crate::infrastructure::config::Exchange;

const AGG_TRADE_EVENT: &str = "aggTrade";

/// Streams per SUBSCRIBE request.
const MAX_PARAMS_PER_REQUEST: usize = 100;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Frame {
    Combined { data: Event },
    Raw(Event),
    Response(Response),
}

#[derive(Debug, Deserialize)]
struct Response {
    #[serde(default)]
    error: Option<ResponseError>,
}

#[derive(Debug, Deserialize)]
struct ResponseError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "e")]
    event_type: String,
    #[serde(rename = "s", default)]
    symbol: String,
    #[serde(rename = "q", default)]
    quantity: String,
    #[serde(rename = "m", default)]
    buyer_is_maker: bool,
}

/// Codec for Binance USD-M aggregate trades.
#[derive(Debug, Clone)]
pub struct BinanceCodec {
    source: Source,
}

impl Default for BinanceCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BinanceCodec {
    /// Create a Binance codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Exchange::Binance.source(),
        }
    }

    fn trade(&self, event: Event) -> Result<Option<TradeEvent>, CodecError> {
        if event.event_type != AGG_TRADE_EVENT {
            return Ok(None);
        }

        let side = if event.buyer_is_maker {
            Side::Sell
        } else {
            Side::Buy
        };

        Ok(Some(TradeEvent::new(
            self.source.clone(),
            Symbol::new(event.symbol),
            side,
            parse_quantity(&event.quantity)?,
        )))
    }
}

impl TradeCodec for BinanceCodec {
    fn exchange(&self) -> Exchange {
        Exchange::Binance
    }

    fn subscribe_messages(&self, symbols: &[Symbol]) -> Vec<String> {
        symbols
            .chunks(MAX_PARAMS_PER_REQUEST)
            .zip(1u64..)
            .map(|(chunk, id)| {
                let params: Vec<String> = chunk
                    .iter()
                    .map(|s| format!("{}@{AGG_TRADE_EVENT}", s.as_str().to_lowercase()))
                    .collect();
                serde_json::json!({ "method": "SUBSCRIBE", "params": params, "id": id })
                    .to_string()
            })
            .collect()
    }

    fn ping_message(&self) -> Option<String> {
        None
    }

    fn decode(&self, text: &str) -> Result<Vec<TradeEvent>, CodecError> {
        let event = match serde_json::from_str::<Frame>(text)? {
            Frame::Combined { data } | Frame::Raw(data) => data,
            Frame::Response(Response { error: Some(error) }) => {
                return Err(CodecError::Rejected(format!(
                    "code {}: {}",
                    error.code, error.msg
                )));
            }
            Frame::Response(Response { error: None }) => return Ok(Vec::new()),
        };

        Ok(self.trade(event)?.into_iter().collect())
    }
}
