//! Delta Sink Port (Driven Port)
//!
//! Interface for recording computed volume deltas. Implementations include
//! logging, an in-memory latest-value cache and an in-process broadcast.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::interval::Interval;
use crate::domain::market::{Source, Symbol};
use crate::domain::volume::FlushRecord;

/// Delta sink error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkError {
    /// The sink cannot currently accept records.
    #[error("delta sink unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// The sink refused this record.
    #[error("delta record rejected: {message}")]
    Rejected {
        /// Error details.
        message: String,
    },
}

/// A computed volume delta for one (source, symbol, interval) window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeltaRecord {
    /// Feed the volume came from.
    pub source: Source,
    /// Traded instrument.
    pub symbol: Symbol,
    /// Interval whose window was closed.
    pub interval: Interval,
    /// Buy volume minus sell volume.
    pub delta: f64,
    /// Buy volume captured by the flush.
    pub buy_volume: f64,
    /// Sell volume captured by the flush.
    pub sell_volume: f64,
    /// When the window was flushed.
    pub recorded_at: DateTime<Utc>,
}

impl DeltaRecord {
    /// Build a record from a flushed bucket.
    #[must_use]
    pub fn from_flush(record: FlushRecord, recorded_at: DateTime<Utc>) -> Self {
        let delta = record.delta();
        Self {
            source: record.source,
            symbol: record.symbol,
            interval: record.interval,
            delta,
            buy_volume: record.buy_volume,
            sell_volume: record.sell_volume,
            recorded_at,
        }
    }
}

/// Port for recording volume deltas.
#[async_trait]
pub trait DeltaSink: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Record one delta.
    async fn record_delta(&self, record: &DeltaRecord) -> Result<(), SinkError>;
}

/// No-op sink for testing.
#[derive(Debug, Clone, Default)]
pub struct NoOpSink;

#[async_trait]
impl DeltaSink for NoOpSink {
    fn name(&self) -> &'static str {
        "noop"
    }

    async fn record_delta(&self, _record: &DeltaRecord) -> Result<(), SinkError> {
        Ok(())
    }
}
