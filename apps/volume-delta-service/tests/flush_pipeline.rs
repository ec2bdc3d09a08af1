//! Flush Pipeline Integration Tests
//!
//! Tests the data flow from the trade channel through the accumulator and
//! flush coordinator into the delta sinks.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use volume_delta_service::{
    BroadcastSink, DeltaRecord, DeltaSink, FanoutSink, FlushCoordinator, Interval,
    LatestDeltaCache, Side, SinkError, Source, Symbol, SystemClock, TradeAccumulator, TradeEvent,
    VolumeBucketStore,
};

/// Sink that is always down.
struct UnavailableSink;

#[async_trait]
impl DeltaSink for UnavailableSink {
    fn name(&self) -> &'static str {
        "unavailable"
    }

    async fn record_delta(&self, _record: &DeltaRecord) -> Result<(), SinkError> {
        Err(SinkError::Unavailable {
            message: "connection refused".to_string(),
        })
    }
}

fn store() -> Arc<VolumeBucketStore> {
    let store = Arc::new(VolumeBucketStore::new([
        Interval::FiveMinutes,
        Interval::FourHours,
    ]));
    store
        .initialize(
            &Source::new("bybit"),
            [Symbol::new("BTCUSDT"), Symbol::new("ETHUSDT")],
        )
        .unwrap();
    store
        .initialize(&Source::new("binance"), [Symbol::new("BTCUSDT")])
        .unwrap();
    store
}

fn trade(source: &str, symbol: &str, side: Side, quantity: f64) -> TradeEvent {
    TradeEvent::new(Source::new(source), Symbol::new(symbol), side, quantity)
}

/// Push trades through a running accumulator and wait for it to drain.
async fn accumulate(accumulator: &Arc<TradeAccumulator>, trades: Vec<TradeEvent>) {
    let (tx, rx) = mpsc::channel(8);
    let task = {
        let accumulator = Arc::clone(accumulator);
        tokio::spawn(async move { accumulator.run(rx, CancellationToken::new()).await })
    };

    for trade in trades {
        tx.send(trade).await.unwrap();
    }
    drop(tx);

    timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
}

#[tokio::test]
async fn trades_flow_into_cached_deltas() {
    let store = store();
    let accumulator = Arc::new(TradeAccumulator::new(Arc::clone(&store)));
    let cache = Arc::new(LatestDeltaCache::new());
    let coordinator = FlushCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&cache) as Arc<dyn DeltaSink>,
        Arc::new(SystemClock),
    );

    accumulate(
        &accumulator,
        vec![
            trade("bybit", "BTCUSDT", Side::Buy, 1.5),
            trade("bybit", "BTCUSDT", Side::Sell, 0.5),
            trade("binance", "BTCUSDT", Side::Sell, 2.0),
            trade("bybit", "SOLUSDT", Side::Buy, 100.0),
            trade("bybit", "ETHUSDT", Side::Buy, -3.0),
        ],
    )
    .await;

    let stats = accumulator.stats();
    assert_eq!(stats.applied, 3);
    assert_eq!(stats.unknown_symbol, 1);
    assert_eq!(stats.invalid_quantity, 1);

    let report = coordinator.on_tick(Interval::FiveMinutes).await;
    assert_eq!(report.records, 3);
    assert_eq!(report.delivered, 3);

    let bybit_btc = cache
        .get(&Source::new("bybit"), &Symbol::new("BTCUSDT"), Interval::FiveMinutes)
        .unwrap();
    assert_eq!(bybit_btc.delta, 1.0);
    assert_eq!(bybit_btc.buy_volume, 1.5);

    let binance_btc = cache
        .get(&Source::new("binance"), &Symbol::new("BTCUSDT"), Interval::FiveMinutes)
        .unwrap();
    assert_eq!(binance_btc.delta, -2.0);

    let bybit_eth = cache
        .get(&Source::new("bybit"), &Symbol::new("ETHUSDT"), Interval::FiveMinutes)
        .unwrap();
    assert_eq!(bybit_eth.delta, 0.0);

    // The 4h window is still open
    assert!(cache
        .get(&Source::new("bybit"), &Symbol::new("BTCUSDT"), Interval::FourHours)
        .is_none());
    assert_eq!(store.snapshot(Interval::FourHours)[1].buy_volume, 1.5);
}

#[tokio::test]
async fn failing_sink_does_not_starve_other_sinks() {
    let store = store();
    let accumulator = Arc::new(TradeAccumulator::new(Arc::clone(&store)));
    let cache = Arc::new(LatestDeltaCache::new());
    let broadcast = Arc::new(BroadcastSink::new(16));
    let mut deltas = broadcast.subscribe();

    let sinks: Vec<Arc<dyn DeltaSink>> = vec![
        Arc::new(UnavailableSink),
        Arc::clone(&cache) as Arc<dyn DeltaSink>,
        Arc::clone(&broadcast) as Arc<dyn DeltaSink>,
    ];
    let coordinator = FlushCoordinator::new(
        Arc::clone(&store),
        Arc::new(FanoutSink::new(sinks)),
        Arc::new(SystemClock),
    );

    accumulate(&accumulator, vec![trade("bybit", "ETHUSDT", Side::Sell, 7.0)]).await;

    let report = coordinator.on_tick(Interval::FiveMinutes).await;

    // Every record failed on one inner sink but still reached the others
    assert_eq!(report.records, 3);
    assert_eq!(report.failed, 3);
    assert_eq!(cache.len(), 3);

    let mut received = Vec::new();
    while let Ok(record) = deltas.try_recv() {
        received.push(record);
    }
    assert_eq!(received.len(), 3);
    assert!(received
        .iter()
        .any(|r| r.symbol == Symbol::new("ETHUSDT") && r.delta == -7.0));

    // The window was closed regardless of the failures
    let after = coordinator.on_tick(Interval::FiveMinutes).await;
    assert_eq!(after.records, 3);
    assert!(cache.all().iter().all(|r| r.interval != Interval::FiveMinutes || r.delta == 0.0));
}

#[tokio::test]
async fn shutdown_flush_reports_every_interval() {
    let store = store();
    let accumulator = Arc::new(TradeAccumulator::new(Arc::clone(&store)));
    let cache = Arc::new(LatestDeltaCache::new());
    let coordinator = FlushCoordinator::new(
        Arc::clone(&store),
        Arc::clone(&cache) as Arc<dyn DeltaSink>,
        Arc::new(SystemClock),
    );

    accumulate(&accumulator, vec![trade("binance", "BTCUSDT", Side::Buy, 3.25)]).await;

    let reports = coordinator.flush_all().await;

    assert_eq!(reports.len(), 2);
    for interval in [Interval::FiveMinutes, Interval::FourHours] {
        let record = cache
            .get(&Source::new("binance"), &Symbol::new("BTCUSDT"), interval)
            .unwrap();
        assert_eq!(record.delta, 3.25);
    }
}
