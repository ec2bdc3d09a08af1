//! Volume Delta Service Binary
//!
//! Starts the exchange feeds, the trade accumulator, the interval scheduler
//! and the health server.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin volume-delta-service
//! ```
//!
//! # Environment Variables
//!
//! At least one feed needs symbols to do anything useful.
//!
//! - `VOLUME_DELTA_INTERVALS`: Comma-separated intervals (default: 5m,15m,30m,1h,4h,1d)
//! - `VOLUME_DELTA_TRADE_CHANNEL_CAPACITY`: Trade queue size (default: 65536)
//! - `VOLUME_DELTA_FLUSH_ON_SHUTDOWN`: Flush open intervals on exit (default: false)
//! - `VOLUME_DELTA_BYBIT_SYMBOLS` / `VOLUME_DELTA_BINANCE_SYMBOLS`: Comma-separated symbols per exchange
//! - `VOLUME_DELTA_BYBIT_WS_URL` / `VOLUME_DELTA_BINANCE_WS_URL`: Override the exchange endpoint
//! - `VOLUME_DELTA_SINKS`: Comma-separated sinks - log | cache | broadcast (default: log,cache)
//! - `VOLUME_DELTA_HEALTH_PORT`: Health check HTTP port (default: 8083)
//! - `OTEL_ENABLED`: Enable OpenTelemetry (default: true)
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: OTLP endpoint (default: <http://localhost:4317>)
//! - `RUST_LOG`: Log level (default: info)

use std::sync::Arc;
use std::time::Duration;

use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use volume_delta_service::infrastructure::exchanges::FeedClient;
use volume_delta_service::infrastructure::metrics::set_tracked_buckets;
use volume_delta_service::infrastructure::telemetry;
use volume_delta_service::{
    BroadcastSink, DeltaSink, FanoutSink, FlushCoordinator, HealthServer, HealthServerState,
    IntervalScheduler, LatestDeltaCache, LoggingSink, ServiceConfig, SinkKind, SystemClock,
    TradeAccumulator, TradeEvent, VolumeBucketStore, init_metrics,
};

/// Graceful shutdown timeout.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    load_dotenv();

    // Initialize telemetry (OpenTelemetry + tracing)
    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting Volume Delta Service");

    // Initialize Prometheus metrics
    let _metrics_handle = init_metrics();

    let config = ServiceConfig::from_env()?;
    log_config(&config);

    let shutdown_token = CancellationToken::new();

    // Bucket store, pre-populated with every configured feed's symbols
    let store = Arc::new(VolumeBucketStore::new(
        config.accounting.intervals.iter().copied(),
    ));
    for feed in config.enabled_feeds() {
        let created = store.initialize(&feed.exchange.source(), feed.symbols.iter().cloned())?;
        tracing::info!(
            source = feed.exchange.as_str(),
            symbols = feed.symbols.len(),
            buckets = created,
            "Source initialized"
        );
    }
    set_tracked_buckets(store.stats().buckets);

    // Delta sinks
    let cache = config
        .sinks
        .has(SinkKind::Cache)
        .then(|| Arc::new(LatestDeltaCache::new()));
    let mut sinks: Vec<Arc<dyn DeltaSink>> = Vec::new();
    if config.sinks.has(SinkKind::Log) {
        sinks.push(Arc::new(LoggingSink));
    }
    if let Some(cache) = &cache {
        sinks.push(Arc::clone(cache) as Arc<dyn DeltaSink>);
    }
    if config.sinks.has(SinkKind::Broadcast) {
        sinks.push(Arc::new(BroadcastSink::new(config.sinks.broadcast_capacity)));
    }
    let sink = Arc::new(FanoutSink::new(sinks));
    tracing::info!(sinks = ?sink.names(), "Delta sinks configured");

    // Trade accumulator
    let (trade_tx, trade_rx) = mpsc::channel::<TradeEvent>(config.accounting.trade_channel_capacity);
    let accumulator = Arc::new(TradeAccumulator::new(Arc::clone(&store)));
    let accumulator_task = {
        let accumulator = Arc::clone(&accumulator);
        let cancel = shutdown_token.clone();
        tokio::spawn(async move { accumulator.run(trade_rx, cancel).await })
    };

    // Exchange feeds
    let mut feed_states = Vec::new();
    let mut feed_tasks: Vec<JoinHandle<()>> = Vec::new();
    for feed in config.enabled_feeds() {
        let client = Arc::new(FeedClient::new(
            feed,
            &config.websocket,
            trade_tx.clone(),
            shutdown_token.clone(),
        ));
        feed_states.push(client.state());

        let exchange = feed.exchange;
        feed_tasks.push(tokio::spawn(async move {
            if let Err(e) = client.run().await {
                tracing::error!(exchange = exchange.as_str(), error = %e, "Feed client error");
            }
        }));
    }
    // The accumulator channel closes once every feed client has stopped
    drop(trade_tx);

    if feed_tasks.is_empty() {
        tracing::warn!("No exchange feed has symbols configured, no trades will be received");
    }

    // Interval scheduler
    let coordinator = Arc::new(FlushCoordinator::new(
        Arc::clone(&store),
        sink,
        Arc::new(SystemClock),
    ));
    let scheduler = IntervalScheduler::spawn(
        Arc::clone(&coordinator),
        coordinator.intervals(),
        Arc::new(SystemClock),
        &shutdown_token,
    );

    // Health server
    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        Arc::clone(&accumulator),
        feed_states,
        cache,
    ));
    let health_server = HealthServer::new(
        config.server.health_port,
        health_state,
        shutdown_token.clone(),
    );
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Volume delta service ready");

    await_shutdown(shutdown_token).await;

    let flush_on_shutdown = config.accounting.flush_on_shutdown;
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        scheduler.shutdown().await;

        for task in feed_tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Feed task failed");
            }
        }
        if let Err(e) = accumulator_task.await {
            tracing::error!(error = %e, "Accumulator task failed");
        }

        if flush_on_shutdown {
            for report in coordinator.flush_all().await {
                tracing::info!(
                    interval = %report.interval,
                    records = report.records,
                    failed = report.failed,
                    "Shutdown flush"
                );
            }
        }
    })
    .await;

    if drained.is_err() {
        tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Graceful shutdown timed out"
        );
    }

    tracing::info!(stats = ?accumulator.stats(), "Volume delta service stopped");
    Ok(())
}

/// Load .env file from current or ancestor directories.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Log the parsed configuration.
fn log_config(config: &ServiceConfig) {
    let intervals: Vec<_> = config
        .accounting
        .intervals
        .iter()
        .map(|i| i.as_str())
        .collect();
    tracing::info!(
        intervals = ?intervals,
        feeds = config.enabled_feeds().count(),
        health_port = config.server.health_port,
        flush_on_shutdown = config.accounting.flush_on_shutdown,
        "Configuration loaded"
    );
    for feed in config.enabled_feeds() {
        tracing::debug!(
            exchange = feed.exchange.as_str(),
            url = %feed.ws_url,
            symbols = feed.symbols.len(),
            "Feed endpoint"
        );
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();

    tracing::info!(
        timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
        "Graceful shutdown started"
    );
}
