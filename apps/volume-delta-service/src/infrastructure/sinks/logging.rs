//! Logging sink.

use async_trait::async_trait;

use crate::application::ports::{DeltaRecord, DeltaSink, SinkError};

/// Reports each delta as an `info` log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingSink;

#[async_trait]
impl DeltaSink for LoggingSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn record_delta(&self, record: &DeltaRecord) -> Result<(), SinkError> {
        tracing::info!(
            source = %record.source,
            symbol = %record.symbol,
            interval = %record.interval,
            delta = record.delta,
            buy_volume = record.buy_volume,
            sell_volume = record.sell_volume,
            "Volume delta"
        );
        Ok(())
    }
}
