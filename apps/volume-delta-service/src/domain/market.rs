//! Market Identifiers and Trade Events
//!
//! Canonical, exchange-agnostic shapes consumed by the volume accounting
//! core. Exchange adapters normalize their wire messages into [`TradeEvent`].

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

/// Identifier of a distinct exchange feed (e.g. `bybit`, `binance`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Source(String);

impl Source {
    /// Create a source identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Traded instrument identifier, scoped to a [`Source`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol.
    #[must_use]
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Get the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

// =============================================================================
// Trade Event
// =============================================================================

/// Aggressor side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    /// Taker bought.
    Buy,
    /// Taker sold.
    Sell,
}

impl Side {
    /// Get the side name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
        }
    }
}

/// A normalized trade, consumed exactly once by the accumulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Feed the trade was received from.
    pub source: Source,
    /// Traded instrument.
    pub symbol: Symbol,
    /// Aggressor side.
    pub side: Side,
    /// Traded quantity in base units.
    pub quantity: f64,
}

impl TradeEvent {
    /// Create a trade event.
    #[must_use]
    pub const fn new(source: Source, symbol: Symbol, side: Side, quantity: f64) -> Self {
        Self {
            source,
            symbol,
            side,
            quantity,
        }
    }

    /// A quantity is acceptable when it is a finite, non-negative number.
    #[must_use]
    pub fn has_valid_quantity(&self) -> bool {
        self.quantity.is_finite() && self.quantity >= 0.0
    }
}
