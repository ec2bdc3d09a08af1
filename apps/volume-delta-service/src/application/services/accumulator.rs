//! Trade Accumulator
//!
//! Applies normalized trades from every source to the bucket store, one call
//! per trade, with no batching and no deduplication.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::market::TradeEvent;
use crate::domain::volume::{ApplyOutcome, VolumeBucketStore};
use crate::infrastructure::metrics;

/// Counters of trades seen by the accumulator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct AccumulatorStats {
    /// Trades added to the store.
    pub applied: u64,
    /// Trades dropped because their symbol is not tracked.
    pub unknown_symbol: u64,
    /// Trades dropped because of an invalid quantity.
    pub invalid_quantity: u64,
}

/// Single accumulator shared by all sources.
#[derive(Debug)]
pub struct TradeAccumulator {
    store: Arc<VolumeBucketStore>,
    applied: AtomicU64,
    unknown_symbol: AtomicU64,
    invalid_quantity: AtomicU64,
}

impl TradeAccumulator {
    /// Create an accumulator over a store.
    #[must_use]
    pub const fn new(store: Arc<VolumeBucketStore>) -> Self {
        Self {
            store,
            applied: AtomicU64::new(0),
            unknown_symbol: AtomicU64::new(0),
            invalid_quantity: AtomicU64::new(0),
        }
    }

    /// Apply one trade. Never fails: dropped trades are counted, not raised.
    pub fn on_trade(&self, trade: &TradeEvent) -> ApplyOutcome {
        let outcome = self.store.apply_trade(trade);

        match outcome {
            ApplyOutcome::Applied => {
                self.applied.fetch_add(1, Ordering::Relaxed);
            }
            ApplyOutcome::UnknownSymbol => {
                self.unknown_symbol.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    source = %trade.source,
                    symbol = %trade.symbol,
                    "Dropping trade for untracked symbol"
                );
            }
            ApplyOutcome::InvalidQuantity => {
                self.invalid_quantity.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    source = %trade.source,
                    symbol = %trade.symbol,
                    quantity = trade.quantity,
                    "Dropping trade with invalid quantity"
                );
            }
        }

        metrics::record_trade(&trade.source, outcome);
        outcome
    }

    /// Drain a trade channel until it closes or `cancel` fires.
    ///
    /// Trades already queued when cancellation is observed are still applied
    /// so that nothing the feeds delivered is lost before a final flush.
    pub async fn run(&self, mut rx: mpsc::Receiver<TradeEvent>, cancel: CancellationToken) {
        tracing::info!("Trade accumulator started");

        loop {
            tokio::select! {
                trade = rx.recv() => {
                    let Some(trade) = trade else {
                        tracing::info!("Trade channel closed");
                        break;
                    };
                    self.on_trade(&trade);
                }
                () = cancel.cancelled() => {
                    rx.close();
                    while let Some(trade) = rx.recv().await {
                        self.on_trade(&trade);
                    }
                    tracing::info!("Trade accumulator shutting down");
                    break;
                }
            }
        }
    }

    /// Get the trade counters.
    #[must_use]
    pub fn stats(&self) -> AccumulatorStats {
        AccumulatorStats {
            applied: self.applied.load(Ordering::Relaxed),
            unknown_symbol: self.unknown_symbol.load(Ordering::Relaxed),
            invalid_quantity: self.invalid_quantity.load(Ordering::Relaxed),
        }
    }

    /// The store trades are applied to.
    #[must_use]
    pub const fn store(&self) -> &Arc<VolumeBucketStore> {
        &self.store
    }
}
