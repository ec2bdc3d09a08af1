//! Flush Coordinator
//!
//! Closes one interval's accumulation window: reads and resets every bucket
//! of that interval, computes each delta and hands it to the sink.
//!
//! The reset happens before any record is delivered. A sink failure is
//! logged and counted for that record only; the remaining records of the
//! tick are still delivered and the reset is never undone.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::application::ports::{Clock, DeltaRecord, DeltaSink};
use crate::domain::interval::Interval;
use crate::domain::volume::VolumeBucketStore;
use crate::infrastructure::metrics;

/// Outcome of one flush tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    /// Interval that was flushed.
    pub interval: Interval,
    /// Records captured from the store.
    pub records: usize,
    /// Records the sink accepted.
    pub delivered: usize,
    /// Records the sink failed to record.
    pub failed: usize,
}

/// Flushes intervals from the store into a sink.
pub struct FlushCoordinator {
    store: Arc<VolumeBucketStore>,
    sink: Arc<dyn DeltaSink>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for FlushCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlushCoordinator")
            .field("store", &self.store.stats())
            .field("sink", &self.sink.name())
            .finish_non_exhaustive()
    }
}

impl FlushCoordinator {
    /// Create a coordinator.
    #[must_use]
    pub fn new(
        store: Arc<VolumeBucketStore>,
        sink: Arc<dyn DeltaSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { store, sink, clock }
    }

    /// Flush one interval and deliver its deltas.
    pub async fn on_tick(&self, interval: Interval) -> FlushReport {
        let started = Instant::now();
        let recorded_at = self.clock.now();
        let flushed = self.store.flush_and_reset(interval);

        let mut report = FlushReport {
            interval,
            records: flushed.len(),
            delivered: 0,
            failed: 0,
        };

        for record in flushed {
            let record = DeltaRecord::from_flush(record, recorded_at);
            match self.sink.record_delta(&record).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        sink = self.sink.name(),
                        source = %record.source,
                        symbol = %record.symbol,
                        interval = %interval,
                        delta = record.delta,
                        error = %e,
                        "Failed to record volume delta"
                    );
                }
            }
        }

        metrics::record_flush(interval, report.records, report.failed, started.elapsed());
        tracing::debug!(
            interval = %interval,
            records = report.records,
            delivered = report.delivered,
            failed = report.failed,
            "Interval flushed"
        );

        report
    }

    /// Flush every configured interval, shortest first.
    pub async fn flush_all(&self) -> Vec<FlushReport> {
        let mut reports = Vec::with_capacity(self.store.intervals().len());
        for interval in self.store.intervals() {
            reports.push(self.on_tick(*interval).await);
        }
        reports
    }

    /// Intervals the underlying store is configured with.
    #[must_use]
    pub fn intervals(&self) -> &[Interval] {
        self.store.intervals()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{SinkError, SystemClock};
    use crate::domain::market::{Side, Source, Symbol, TradeEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    /// Sink that records everything and fails for chosen symbols.
    #[derive(Default)]
    struct MockSink {
        recorded: Mutex<Vec<DeltaRecord>>,
        fail_symbols: Vec<Symbol>,
    }

    #[async_trait]
    impl DeltaSink for MockSink {
        fn name(&self) -> &'static str {
            "mock"
        }

        async fn record_delta(&self, record: &DeltaRecord) -> Result<(), SinkError> {
            if self.fail_symbols.contains(&record.symbol) {
                return Err(SinkError::Unavailable {
                    message: "mock failure".to_string(),
                });
            }
            self.recorded.lock().push(record.clone());
            Ok(())
        }
    }

    fn setup(symbols: &[&str], sink: Arc<MockSink>) -> (Arc<VolumeBucketStore>, FlushCoordinator) {
        let store = Arc::new(VolumeBucketStore::new([
            Interval::FiveMinutes,
            Interval::OneHour,
        ]));
        store
            .initialize(&Source::new("X"), symbols.iter().map(|s| Symbol::new(*s)))
            .unwrap();
        let coordinator = FlushCoordinator::new(Arc::clone(&store), sink, Arc::new(SystemClock));
        (store, coordinator)
    }

    fn trade(symbol: &str, side: Side, quantity: f64) -> TradeEvent {
        TradeEvent::new(Source::new("X"), Symbol::new(symbol), side, quantity)
    }

    #[tokio::test]
    async fn on_tick_delivers_delta_per_symbol() {
        let sink = Arc::new(MockSink::default());
        let (store, coordinator) = setup(&["BTC", "ETH"], Arc::clone(&sink));

        store.apply_trade(&trade("BTC", Side::Buy, 10.0));
        store.apply_trade(&trade("BTC", Side::Sell, 3.0));
        store.apply_trade(&trade("BTC", Side::Buy, 2.0));
        store.apply_trade(&trade("ETH", Side::Sell, 4.0));

        let report = coordinator.on_tick(Interval::FiveMinutes).await;

        assert_eq!(
            report,
            FlushReport {
                interval: Interval::FiveMinutes,
                records: 2,
                delivered: 2,
                failed: 0,
            }
        );

        let recorded = sink.recorded.lock();
        assert_eq!(recorded[0].symbol, Symbol::new("BTC"));
        assert_eq!(recorded[0].delta, 9.0);
        assert_eq!(recorded[1].symbol, Symbol::new("ETH"));
        assert_eq!(recorded[1].delta, -4.0);
        assert!(recorded.iter().all(|r| r.interval == Interval::FiveMinutes));
    }

    #[tokio::test]
    async fn zero_deltas_are_still_reported() {
        let sink = Arc::new(MockSink::default());
        let (_store, coordinator) = setup(&["BTC"], Arc::clone(&sink));

        let report = coordinator.on_tick(Interval::OneHour).await;

        assert_eq!(report.delivered, 1);
        assert_eq!(sink.recorded.lock()[0].delta, 0.0);
    }

    #[tokio::test]
    async fn sink_failure_does_not_abort_tick_or_roll_back_reset() {
        let sink = Arc::new(MockSink {
            fail_symbols: vec![Symbol::new("BTC")],
            ..MockSink::default()
        });
        let (store, coordinator) = setup(&["BTC", "ETH"], Arc::clone(&sink));

        store.apply_trade(&trade("BTC", Side::Buy, 5.0));
        store.apply_trade(&trade("ETH", Side::Buy, 1.0));

        let report = coordinator.on_tick(Interval::FiveMinutes).await;

        assert_eq!(report.records, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.recorded.lock()[0].symbol, Symbol::new("ETH"));

        // The failed record's bucket was reset anyway
        let snapshot = store.snapshot(Interval::FiveMinutes);
        assert_eq!(snapshot[0].buy_volume, 0.0);
    }

    #[tokio::test]
    async fn on_tick_only_touches_its_interval() {
        let sink = Arc::new(MockSink::default());
        let (store, coordinator) = setup(&["BTC"], sink);

        store.apply_trade(&trade("BTC", Side::Buy, 5.0));
        coordinator.on_tick(Interval::FiveMinutes).await;

        assert_eq!(store.snapshot(Interval::OneHour)[0].buy_volume, 5.0);
    }

    #[tokio::test]
    async fn flush_all_covers_every_interval() {
        let sink = Arc::new(MockSink::default());
        let (store, coordinator) = setup(&["BTC"], Arc::clone(&sink));
        store.apply_trade(&trade("BTC", Side::Sell, 2.0));

        let reports = coordinator.flush_all().await;

        let intervals: Vec<_> = reports.iter().map(|r| r.interval).collect();
        assert_eq!(intervals, vec![Interval::FiveMinutes, Interval::OneHour]);
        assert!(sink.recorded.lock().iter().all(|r| r.delta == -2.0));
    }
}
