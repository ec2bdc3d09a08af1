//! Bybit v5 Public Trade Stream
//!
//! # Protocol
//!
//! Subscribe with `{"op":"subscribe","args":["publicTrade.BTCUSDT", ...]}`.
//! Trades arrive batched:
//!
//! ```json
//! {"topic":"publicTrade.BTCUSDT","type":"snapshot","ts":1672304486868,
//!  "data":[{"T":1672304486865,"s":"BTCUSDT","S":"Buy","v":"0.001","p":"16578.50"}]}
//! ```
//!
//! `S` is the taker side. The server drops connections that send nothing for
//! a while, so clients send `{"op":"ping"}` every 20 seconds.

use serde::Deserialize;

use super::codec::{CodecError, TradeCodec, parse_quantity};
use crate::domain::market::{Side, Source, Symbol, TradeEvent};
use crate::infrastructure::config::Exchange;

const TRADE_TOPIC_PREFIX: &str = "publicTrade.";

/// Topics per subscribe request accepted by the linear stream.
const MAX_ARGS_PER_REQUEST: usize = 10;

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(default)]
    topic: Option<String>,
    #[serde(default)]
    data: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    op: Option<String>,
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    ret_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Trade {
    #[serde(rename = "s")]
    symbol: String,
    #[serde(rename = "S")]
    side: String,
    #[serde(rename = "v")]
    volume: String,
}

/// Codec for Bybit linear perpetual trades.
#[derive(Debug, Clone)]
pub struct BybitCodec {
    source: Source,
}

impl Default for BybitCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BybitCodec {
    /// Create a Bybit codec.
    #[must_use]
    pub fn new() -> Self {
        Self {
            source: Exchange::Bybit.source(),
        }
    }

    fn trade(&self, raw: serde_json::Value) -> Result<TradeEvent, CodecError> {
        let trade: Trade = serde_json::from_value(raw)?;
        Ok(TradeEvent::new(
            self.source.clone(),
            Symbol::new(trade.symbol),
            Self::side(&trade.side)?,
            parse_quantity(&trade.volume)?,
        ))
    }

    fn side(raw: &str) -> Result<Side, CodecError> {
        match raw {
            "Buy" => Ok(Side::Buy),
            "Sell" => Ok(Side::Sell),
            other => Err(CodecError::UnknownSide(other.to_string())),
        }
    }
}

impl TradeCodec for BybitCodec {
    fn exchange(&self) -> Exchange {
        Exchange::Bybit
    }

    fn subscribe_messages(&self, symbols: &[Symbol]) -> Vec<String> {
        symbols
            .chunks(MAX_ARGS_PER_REQUEST)
            .map(|chunk| {
                let args: Vec<String> = chunk
                    .iter()
                    .map(|s| format!("{TRADE_TOPIC_PREFIX}{s}"))
                    .collect();
                serde_json::json!({ "op": "subscribe", "args": args }).to_string()
            })
            .collect()
    }

    fn ping_message(&self) -> Option<String> {
        Some(r#"{"op":"ping"}"#.to_string())
    }

    fn decode(&self, text: &str) -> Result<Vec<TradeEvent>, CodecError> {
        let frame: Frame = serde_json::from_str(text)?;

        if frame.success == Some(false) {
            let op = frame.op.unwrap_or_default();
            let msg = frame.ret_msg.unwrap_or_default();
            return Err(CodecError::Rejected(format!("{op}: {msg}")));
        }

        let is_trade_topic = frame
            .topic
            .as_deref()
            .is_some_and(|t| t.starts_with(TRADE_TOPIC_PREFIX));
        if !is_trade_topic {
            return Ok(Vec::new());
        }

        // A bad entry only costs that entry; the rest of the batch is kept.
        let trades = frame
            .data
            .unwrap_or_default()
            .into_iter()
            .filter_map(|raw| match self.trade(raw) {
                Ok(trade) => Some(trade),
                Err(e) => {
                    tracing::warn!(
                        source = %self.source,
                        topic = frame.topic.as_deref().unwrap_or_default(),
                        error = %e,
                        "Skipping malformed trade in batch"
                    );
                    None
                }
            })
            .collect();
        Ok(trades)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_trade_batch() {
        let text = r#"{
            "topic": "publicTrade.BTCUSDT",
            "type": "snapshot",
            "ts": 1672304486868,
            "data": [
                {"T": 1672304486865, "s": "BTCUSDT", "S": "Buy", "v": "0.001", "p": "16578.50", "L": "PlusTick", "i": "20f43950", "BT": false},
                {"T": 1672304486866, "s": "BTCUSDT", "S": "Sell", "v": "2.5", "p": "16578.00", "L": "MinusTick", "i": "20f43951", "BT": false}
            ]
        }"#;

        let trades = BybitCodec::new().decode(text).unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].source, Source::new("bybit"));
        assert_eq!(trades[0].symbol, Symbol::new("BTCUSDT"));
        assert_eq!(trades[0].side, Side::Buy);
        assert!((trades[0].quantity - 0.001).abs() < f64::EPSILON);
        assert_eq!(trades[1].side, Side::Sell);
        assert!((trades[1].quantity - 2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn control_frames_carry_no_trades() {
        let codec = BybitCodec::new();
        let pong = r#"{"success":true,"ret_msg":"pong","conn_id":"abc","op":"ping"}"#;
        let ack = r#"{"success":true,"ret_msg":"","conn_id":"abc","op":"subscribe"}"#;

        assert!(codec.decode(pong).unwrap().is_empty());
        assert!(codec.decode(ack).unwrap().is_empty());
    }

    #[test]
    fn failed_subscription_is_reported() {
        let text = r#"{"success":false,"ret_msg":"error:handler not found","op":"subscribe"}"#;
        let err = BybitCodec::new().decode(text).unwrap_err();
        assert!(matches!(err, CodecError::Rejected(msg) if msg.contains("handler not found")));
    }

    #[test]
    fn unknown_side_entry_is_skipped() {
        let text = r#"{"topic":"publicTrade.ETHUSDT","data":[{"s":"ETHUSDT","S":"None","v":"1"}]}"#;
        assert!(BybitCodec::new().decode(text).unwrap().is_empty());
    }

    #[test]
    fn malformed_entries_do_not_drop_the_batch() {
        let text = r#"{
            "topic": "publicTrade.BTCUSDT",
            "data": [
                {"s": "BTCUSDT", "S": "Buy", "v": "5"},
                {"s": "BTCUSDT", "S": "Sell", "v": "3"},
                {"s": "BTCUSDT", "S": "Buy", "v": ""},
                {"s": "BTCUSDT", "S": "Buy"},
                {"s": "BTCUSDT", "S": "Sell", "v": "1.5"}
            ]
        }"#;

        let trades = BybitCodec::new().decode(text).unwrap();

        let decoded: Vec<(Side, f64)> = trades.iter().map(|t| (t.side, t.quantity)).collect();
        assert_eq!(
            decoded,
            vec![(Side::Buy, 5.0), (Side::Sell, 3.0), (Side::Sell, 1.5)]
        );
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(matches!(
            BybitCodec::new().decode("not json"),
            Err(CodecError::Json(_))
        ));
    }

    #[test]
    fn subscriptions_are_chunked() {
        let symbols: Vec<Symbol> = (0..12).map(|i| Symbol::new(format!("SYM{i}USDT"))).collect();

        let messages = BybitCodec::new().subscribe_messages(&symbols);

        assert_eq!(messages.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&messages[0]).unwrap();
        assert_eq!(first["op"], "subscribe");
        assert_eq!(first["args"].as_array().unwrap().len(), 10);
        assert_eq!(first["args"][0], "publicTrade.SYM0USDT");
    }

    #[test]
    fn sends_application_ping() {
        assert_eq!(BybitCodec::new().ping_message().as_deref(), Some(r#"{"op":"ping"}"#));
    }
}
