//! Broadcast sink.
//!
//! Publishes every delta on a tokio broadcast channel so that any number of
//! in-process consumers can subscribe. Slow receivers lag and lose the oldest
//! records; the sink itself never blocks.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::application::ports::{DeltaRecord, DeltaSink, SinkError};

/// Fans deltas out to broadcast subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastSink {
    tx: broadcast::Sender<DeltaRecord>,
}

impl BroadcastSink {
    /// Create a sink with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to future deltas.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DeltaRecord> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[async_trait]
impl DeltaSink for BroadcastSink {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn record_delta(&self, record: &DeltaRecord) -> Result<(), SinkError> {
        // No subscribers is not a failure
        if let Ok(receivers) = self.tx.send(record.clone()) {
            tracing::trace!(receivers, symbol = %record.symbol, "Delta broadcast");
        }
        Ok(())
    }
}
