//! Exchange Trade Codecs
//!
//! Each supported exchange speaks its own JSON dialect. A [`TradeCodec`]
//! knows how to subscribe to an exchange's public trade stream and how to
//! turn its frames into normalized [`TradeEvent`]s.

use crate::domain::market::{Source, Symbol, TradeEvent};
use crate::infrastructure::config::Exchange;

use super::binance::BinanceCodec;
use super::bybit::BybitCodec;

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Frame is not valid JSON or does not match the expected shape.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Trade side is not one the exchange documents.
    #[error("unknown trade side: {0}")]
    UnknownSide(String),

    /// Trade quantity is not a number.
    #[error("invalid trade quantity: {0}")]
    InvalidQuantity(String),

    /// The exchange rejected a request (e.g. a subscription).
    #[error("request rejected by exchange: {0}")]
    Rejected(String),
}

/// Translates one exchange's wire format.
pub trait TradeCodec: Send + Sync {
    /// Exchange this codec speaks for.
    fn exchange(&self) -> Exchange;

    /// Messages that subscribe to the trade streams of `symbols`.
    fn subscribe_messages(&self, symbols: &[Symbol]) -> Vec<String>;

    /// Application-level keepalive to send periodically, if the exchange
    /// requires one.
    fn ping_message(&self) -> Option<String>;

    /// Decode one text frame into zero or more trades.
    ///
    /// Control frames (acknowledgements, pongs) decode to no trades.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed frames or exchange-reported failures.
    fn decode(&self, text: &str) -> Result<Vec<TradeEvent>, CodecError>;

    /// Source identifier trades are tagged with.
    fn source(&self) -> Source {
        self.exchange().source()
    }
}

/// Get the codec for an exchange.
#[must_use]
pub fn codec_for(exchange: Exchange) -> Box<dyn TradeCodec> {
    match exchange {
        Exchange::Bybit => Box::new(BybitCodec::new()),
        Exchange::Binance => Box::new(BinanceCodec::new()),
    }
}

/// Parse a decimal quantity sent as a JSON string.
pub(super) fn parse_quantity(raw: &str) -> Result<f64, CodecError> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| CodecError::InvalidQuantity(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_for_each_exchange() {
        assert_eq!(codec_for(Exchange::Bybit).exchange(), Exchange::Bybit);
        assert_eq!(codec_for(Exchange::Binance).source(), Source::new("binance"));
    }

    #[test]
    fn quantities_are_parsed_from_strings() {
        assert!((parse_quantity(" 0.015 ").unwrap() - 0.015).abs() < f64::EPSILON);
        assert!(matches!(
            parse_quantity("abc"),
            Err(CodecError::InvalidQuantity(_))
        ));
    }
}
