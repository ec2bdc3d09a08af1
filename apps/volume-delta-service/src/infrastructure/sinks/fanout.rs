//! Fan-out sink.

use std::sync::Arc;

use async_trait::async_trait;

use crate::application::ports::{DeltaRecord, DeltaSink, SinkError};

/// Forwards every delta to each inner sink in order.
///
/// Every inner sink is attempted even if an earlier one fails; the first
/// failure is returned.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn DeltaSink>>,
}

impl std::fmt::Debug for FanoutSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|s| s.name()))
            .finish()
    }
}

impl FanoutSink {
    /// Create a fan-out over the given sinks.
    #[must_use]
    pub fn new(sinks: Vec<Arc<dyn DeltaSink>>) -> Self {
        Self { sinks }
    }

    /// Names of the inner sinks.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }
}

#[async_trait]
impl DeltaSink for FanoutSink {
    fn name(&self) -> &'static str {
        "fanout"
    }

    async fn record_delta(&self, record: &DeltaRecord) -> Result<(), SinkError> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.record_delta(record).await {
                tracing::debug!(sink = sink.name(), error = %e, "Inner sink failed");
                first_error.get_or_insert(e);
            }
        }

        first_error.map_or(Ok(()), Err)
    }
}
