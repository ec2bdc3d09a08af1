//! Latest-value delta cache.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::application::ports::{DeltaRecord, DeltaSink, SinkError};
use crate::domain::interval::Interval;
use crate::domain::market::{Source, Symbol};

type Key = (Source, Symbol, Interval);

/// Keeps the most recent delta for every (source, symbol, interval).
#[derive(Debug, Default)]
pub struct LatestDeltaCache {
    latest: RwLock<HashMap<Key, DeltaRecord>>,
}

impl LatestDeltaCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest delta for one key.
    #[must_use]
    pub fn get(&self, source: &Source, symbol: &Symbol, interval: Interval) -> Option<DeltaRecord> {
        self.latest
            .read()
            .get(&(source.clone(), symbol.clone(), interval))
            .cloned()
    }

    /// Every cached delta, ordered by source, symbol then interval.
    #[must_use]
    pub fn all(&self) -> Vec<DeltaRecord> {
        let mut records: Vec<DeltaRecord> = self.latest.read().values().cloned().collect();
        records.sort_by(|a, b| {
            (&a.source, &a.symbol, a.interval).cmp(&(&b.source, &b.symbol, b.interval))
        });
        records
    }

    /// Number of cached keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.latest.read().len()
    }

    /// Check whether nothing has been cached yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latest.read().is_empty()
    }
}

#[async_trait]
impl DeltaSink for LatestDeltaCache {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn record_delta(&self, record: &DeltaRecord) -> Result<(), SinkError> {
        self.latest.write().insert(
            (record.source.clone(), record.symbol.clone(), record.interval),
            record.clone(),
        );
        Ok(())
    }
}
