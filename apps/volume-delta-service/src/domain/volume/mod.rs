//! Volume Bucket Store
//!
//! Owns every buy/sell accumulator in the process, keyed by
//! (source, symbol, interval), and is the only synchronization point between
//! trade ingestion and scheduled flushes.
//!
//! # Design
//!
//! - The set of sources and symbols lives behind a `RwLock`. Trade
//!   application and flushes only take the read side; the write side is taken
//!   when a source is initialized or a symbol is registered.
//! - Each bucket sits behind its own `Mutex`. A flush swaps a bucket with a
//!   zeroed one while holding that bucket's lock, so a concurrent increment
//!   lands either in the captured window or in the next one, never both and
//!   never neither.
//! - Flushing one interval only touches that interval's buckets. Trades for
//!   other intervals and other symbols are never held up for longer than one
//!   bucket swap.
//!
//! No cross-bucket atomicity is provided: a flush is a correct snapshot per
//! bucket, not an instantaneous snapshot of the whole store.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::{Mutex, RwLock};
use serde::Serialize;

use super::interval::Interval;
use super::market::{Side, Source, Symbol, TradeEvent};

// =============================================================================
// Bucket
// =============================================================================

/// Buy and sell volume accumulated since the last flush.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VolumeBucket {
    /// Sum of buy-side quantities since the last reset.
    pub buy_volume: f64,
    /// Sum of sell-side quantities since the last reset.
    pub sell_volume: f64,
}

impl VolumeBucket {
    fn add(&mut self, side: Side, quantity: f64) {
        match side {
            Side::Buy => self.buy_volume += quantity,
            Side::Sell => self.sell_volume += quantity,
        }
    }

    /// Net volume: buy minus sell.
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.buy_volume - self.sell_volume
    }

    /// Check whether nothing has been accumulated.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn is_empty(&self) -> bool {
        self.buy_volume == 0.0 && self.sell_volume == 0.0
    }
}

/// Buckets for one (source, symbol), one per configured interval.
///
/// Indexed by the position of the interval in [`VolumeBucketStore::intervals`].
#[derive(Debug)]
struct SymbolBuckets {
    buckets: Box<[Mutex<VolumeBucket>]>,
}

impl SymbolBuckets {
    fn new(interval_count: usize) -> Self {
        Self {
            buckets: (0..interval_count)
                .map(|_| Mutex::new(VolumeBucket::default()))
                .collect(),
        }
    }
}

type SourceBuckets = BTreeMap<Symbol, SymbolBuckets>;

// =============================================================================
// Results
// =============================================================================

/// Contents of one bucket captured by a flush or snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlushRecord {
    /// Feed the volume came from.
    pub source: Source,
    /// Traded instrument.
    pub symbol: Symbol,
    /// Interval the bucket belongs to.
    pub interval: Interval,
    /// Captured buy volume.
    pub buy_volume: f64,
    /// Captured sell volume.
    pub sell_volume: f64,
}

impl FlushRecord {
    /// Net volume: buy minus sell.
    #[must_use]
    pub fn delta(&self) -> f64 {
        self.buy_volume - self.sell_volume
    }
}

/// Result of applying a trade to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The trade was added to every configured interval's bucket.
    Applied,
    /// No buckets exist for the (source, symbol); the trade was dropped.
    UnknownSymbol,
    /// The quantity was negative or not finite; the trade was dropped.
    InvalidQuantity,
}

impl ApplyOutcome {
    /// Get the outcome name (used as a metric label).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Applied => "applied",
            Self::UnknownSymbol => "unknown_symbol",
            Self::InvalidQuantity => "invalid_quantity",
        }
    }
}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The source was already initialized.
    #[error("source {0} is already initialized")]
    AlreadyInitialized(Source),

    /// The source has not been initialized yet.
    #[error("source {0} has not been initialized")]
    SourceNotInitialized(Source),
}

/// Size of the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Number of initialized sources.
    pub sources: usize,
    /// Number of tracked (source, symbol) pairs.
    pub symbols: usize,
    /// Number of buckets (symbols times intervals).
    pub buckets: usize,
}

// =============================================================================
// Store
// =============================================================================

/// Thread-safe store of every volume bucket.
///
/// # Example
///
/// ```rust
/// use volume_delta_service::domain::interval::Interval;
/// use volume_delta_service::domain::market::{Side, Source, Symbol, TradeEvent};
/// use volume_delta_service::domain::volume::VolumeBucketStore;
///
/// let store = VolumeBucketStore::new([Interval::FiveMinutes]);
/// let source = Source::new("X");
/// store.initialize(&source, [Symbol::new("BTC")]).unwrap();
///
/// for (side, quantity) in [(Side::Buy, 10.0), (Side::Sell, 3.0), (Side::Buy, 2.0)] {
///     store.apply_trade(&TradeEvent::new(source.clone(), Symbol::new("BTC"), side, quantity));
/// }
///
/// let records = store.flush_and_reset(Interval::FiveMinutes);
/// assert_eq!(records[0].buy_volume, 12.0);
/// assert_eq!(records[0].sell_volume, 3.0);
/// assert_eq!(records[0].delta(), 9.0);
///
/// // The window was reset by the flush
/// let records = store.flush_and_reset(Interval::FiveMinutes);
/// assert_eq!(records[0].delta(), 0.0);
/// ```
#[derive(Debug)]
pub struct VolumeBucketStore {
    intervals: Vec<Interval>,
    sources: RwLock<BTreeMap<Source, SourceBuckets>>,
}

impl VolumeBucketStore {
    /// Create an empty store tracking the given intervals.
    ///
    /// Duplicate intervals are collapsed; intervals are kept shortest first.
    #[must_use]
    pub fn new(intervals: impl IntoIterator<Item = Interval>) -> Self {
        let intervals: BTreeSet<Interval> = intervals.into_iter().collect();
        Self {
            intervals: intervals.into_iter().collect(),
            sources: RwLock::new(BTreeMap::new()),
        }
    }

    /// Configured intervals, shortest first.
    #[must_use]
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Create zeroed buckets for every symbol of a source at every interval.
    ///
    /// Returns the number of buckets created.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyInitialized`] if the source was
    /// initialized before. The existing buckets are left untouched.
    pub fn initialize(
        &self,
        source: &Source,
        symbols: impl IntoIterator<Item = Symbol>,
    ) -> Result<usize, StoreError> {
        let mut sources = self.sources.write();
        if sources.contains_key(source) {
            return Err(StoreError::AlreadyInitialized(source.clone()));
        }

        let interval_count = self.intervals.len();
        let buckets: SourceBuckets = symbols
            .into_iter()
            .map(|symbol| (symbol, SymbolBuckets::new(interval_count)))
            .collect();
        let created = buckets.len() * interval_count;

        sources.insert(source.clone(), buckets);
        Ok(created)
    }

    /// Start tracking a symbol of an already-initialized source.
    ///
    /// Returns `true` if buckets were created, `false` if the symbol was
    /// already tracked.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SourceNotInitialized`] for an unknown source.
    pub fn register_symbol(&self, source: &Source, symbol: Symbol) -> Result<bool, StoreError> {
        {
            let sources = self.sources.read();
            match sources.get(source) {
                None => return Err(StoreError::SourceNotInitialized(source.clone())),
                Some(symbols) if symbols.contains_key(&symbol) => return Ok(false),
                Some(_) => {}
            }
        }

        let mut sources = self.sources.write();
        let symbols = sources
            .get_mut(source)
            .ok_or_else(|| StoreError::SourceNotInitialized(source.clone()))?;
        if symbols.contains_key(&symbol) {
            return Ok(false);
        }
        symbols.insert(symbol, SymbolBuckets::new(self.intervals.len()));
        Ok(true)
    }

    /// Add a trade's quantity to every configured interval's bucket for its
    /// (source, symbol).
    ///
    /// Trades for untracked symbols or with an invalid quantity are dropped
    /// without creating buckets.
    pub fn apply_trade(&self, trade: &TradeEvent) -> ApplyOutcome {
        if !trade.has_valid_quantity() {
            return ApplyOutcome::InvalidQuantity;
        }

        let sources = self.sources.read();
        let Some(buckets) = sources
            .get(&trade.source)
            .and_then(|symbols| symbols.get(&trade.symbol))
        else {
            return ApplyOutcome::UnknownSymbol;
        };

        for bucket in &buckets.buckets {
            bucket.lock().add(trade.side, trade.quantity);
        }

        ApplyOutcome::Applied
    }

    /// Capture and zero every bucket of one interval.
    ///
    /// Each bucket is read and reset under its own lock. Records are ordered
    /// by (source, symbol). An interval that is not configured yields no
    /// records.
    pub fn flush_and_reset(&self, interval: Interval) -> Vec<FlushRecord> {
        self.collect(interval, std::mem::take)
    }

    /// Read every bucket of one interval without resetting it.
    #[must_use]
    pub fn snapshot(&self, interval: Interval) -> Vec<FlushRecord> {
        self.collect(interval, |bucket| *bucket)
    }

    /// Check whether buckets exist for a (source, symbol).
    #[must_use]
    pub fn is_tracked(&self, source: &Source, symbol: &Symbol) -> bool {
        self.sources
            .read()
            .get(source)
            .is_some_and(|symbols| symbols.contains_key(symbol))
    }

    /// Get the size of the store.
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        let sources = self.sources.read();
        let symbols: usize = sources.values().map(BTreeMap::len).sum();
        StoreStats {
            sources: sources.len(),
            symbols,
            buckets: symbols * self.intervals.len(),
        }
    }

    fn collect(
        &self,
        interval: Interval,
        read: impl Fn(&mut VolumeBucket) -> VolumeBucket,
    ) -> Vec<FlushRecord> {
        let Some(index) = self.intervals.iter().position(|i| *i == interval) else {
            return Vec::new();
        };

        let sources = self.sources.read();
        let mut records = Vec::with_capacity(sources.values().map(BTreeMap::len).sum());

        for (source, symbols) in sources.iter() {
            for (symbol, buckets) in symbols {
                let captured = read(&mut buckets.buckets[index].lock());
                records.push(FlushRecord {
                    source: source.clone(),
                    symbol: symbol.clone(),
                    interval,
                    buy_volume: captured.buy_volume,
                    sell_volume: captured.sell_volume,
                });
            }
        }

        records
    }
}

// =============================================================================
// Tests
// =============================================================================
