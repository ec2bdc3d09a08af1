//! Health Check, Metrics and Delta Endpoints
//!
//! HTTP endpoint for health checks, feed status, Prometheus metrics and the
//! latest computed deltas.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (checks feed connections)
//! - `GET /metrics` - Prometheus metrics in text format
//! - `GET /deltas` - Latest delta per (source, symbol, interval); optional
//!   `interval`, `source` and `symbol` query filters

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{AccumulatorStats, TradeAccumulator};
use crate::domain::interval::Interval;
use crate::domain::volume::StoreStats;
use crate::infrastructure::exchanges::{FeedState, FeedStatus};
use crate::infrastructure::metrics::{get_metrics_handle, set_tracked_buckets};
use crate::infrastructure::sinks::LatestDeltaCache;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Status of every configured feed.
    pub feeds: Vec<FeedStatus>,
    /// Size of the bucket store.
    pub store: StoreStats,
    /// Trades seen by the accumulator.
    pub trades: AccumulatorStats,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All feeds connected (or none configured).
    Healthy,
    /// Some feeds connected.
    Degraded,
    /// No configured feed connected.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    accumulator: Arc<TradeAccumulator>,
    feeds: Vec<Arc<FeedState>>,
    cache: Option<Arc<LatestDeltaCache>>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        accumulator: Arc<TradeAccumulator>,
        feeds: Vec<Arc<FeedState>>,
        cache: Option<Arc<LatestDeltaCache>>,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            accumulator,
            feeds,
            cache,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

/// Build the HTTP routes.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .route("/deltas", get(deltas_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let is_ready = state.feeds.is_empty() || state.feeds.iter().any(|feed| feed.is_connected());

    if is_ready {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            set_tracked_buckets(state.accumulator.store().stats().buckets);
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

/// Query filters for `/deltas`.
#[derive(Debug, Default, Deserialize)]
struct DeltaQuery {
    interval: Option<Interval>,
    source: Option<String>,
    symbol: Option<String>,
}

async fn deltas_handler(
    State(state): State<Arc<HealthServerState>>,
    Query(query): Query<DeltaQuery>,
) -> Response {
    let Some(cache) = &state.cache else {
        return (StatusCode::NOT_FOUND, "delta cache is not enabled").into_response();
    };

    let records: Vec<_> = cache
        .all()
        .into_iter()
        .filter(|r| query.interval.is_none_or(|i| r.interval == i))
        .filter(|r| {
            query
                .source
                .as_deref()
                .is_none_or(|s| r.source.as_str().eq_ignore_ascii_case(s))
        })
        .filter(|r| {
            query
                .symbol
                .as_deref()
                .is_none_or(|s| r.symbol.as_str().eq_ignore_ascii_case(s))
        })
        .collect();

    Json(records).into_response()
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let feeds: Vec<FeedStatus> = state.feeds.iter().map(|feed| feed.status()).collect();
    let connected = state.feeds.iter().filter(|feed| feed.is_connected()).count();

    HealthResponse {
        status: determine_health_status(connected, feeds.len()),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        feeds,
        store: state.accumulator.store().stats(),
        trades: state.accumulator.stats(),
    }
}

const fn determine_health_status(connected: usize, total: usize) -> HealthStatus {
    if connected == total {
        HealthStatus::Healthy
    } else if connected > 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Unhealthy
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{DeltaRecord, DeltaSink};
    use crate::domain::market::{Source, Symbol};
    use crate::domain::volume::VolumeBucketStore;
    use crate::infrastructure::exchanges::ConnectionState;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(feeds: Vec<Arc<FeedState>>, cache: Option<Arc<LatestDeltaCache>>) -> Arc<HealthServerState> {
        let store = Arc::new(VolumeBucketStore::new([Interval::FiveMinutes, Interval::OneHour]));
        store
            .initialize(&Source::new("bybit"), [Symbol::new("BTCUSDT")])
            .unwrap();
        Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            Arc::new(TradeAccumulator::new(store)),
            feeds,
            cache,
        ))
    }

    fn feed(source: &str, connection: ConnectionState) -> Arc<FeedState> {
        let feed = Arc::new(FeedState::new(Source::new(source)));
        feed.set_state(connection);
        feed
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    fn delta(symbol: &str, interval: Interval, delta: f64) -> DeltaRecord {
        DeltaRecord {
            source: Source::new("bybit"),
            symbol: Symbol::new(symbol),
            interval,
            delta,
            buy_volume: 0.0,
            sell_volume: 0.0,
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Degraded).unwrap(),
            "\"degraded\""
        );
    }

    #[test]
    fn status_from_connected_feeds() {
        assert_eq!(determine_health_status(0, 0), HealthStatus::Healthy);
        assert_eq!(determine_health_status(2, 2), HealthStatus::Healthy);
        assert_eq!(determine_health_status(1, 2), HealthStatus::Degraded);
        assert_eq!(determine_health_status(0, 2), HealthStatus::Unhealthy);
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        let (status, body) = get(state(vec![], None), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "OK");
    }

    #[tokio::test]
    async fn readiness_requires_a_connected_feed() {
        let (status, _) = get(state(vec![], None), "/readyz").await;
        assert_eq!(status, StatusCode::OK);

        let down = vec![feed("bybit", ConnectionState::Reconnecting)];
        let (status, body) = get(state(down, None), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "NOT READY");

        let mixed = vec![
            feed("bybit", ConnectionState::Reconnecting),
            feed("binance", ConnectionState::Connected),
        ];
        let (status, _) = get(state(mixed, None), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn health_reports_feeds_and_store() {
        let feeds = vec![
            feed("bybit", ConnectionState::Connected),
            feed("binance", ConnectionState::Connecting),
        ];

        let (status, body) = get(state(feeds, None), "/health").await;
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["version"], "0.1.0");
        assert_eq!(json["feeds"][0]["state"], "connected");
        assert_eq!(json["store"]["buckets"], 2);
        assert_eq!(json["trades"]["applied"], 0);
    }

    #[tokio::test]
    async fn deltas_without_cache_is_not_found() {
        let (status, _) = get(state(vec![], None), "/deltas").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn deltas_are_filtered_by_query() {
        let cache = Arc::new(LatestDeltaCache::new());
        cache.record_delta(&delta("BTCUSDT", Interval::FiveMinutes, 1.0)).await.unwrap();
        cache.record_delta(&delta("BTCUSDT", Interval::OneHour, 2.0)).await.unwrap();
        cache.record_delta(&delta("ETHUSDT", Interval::FiveMinutes, 3.0)).await.unwrap();

        let (status, body) = get(state(vec![], Some(cache.clone())), "/deltas").await;
        let all: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 3);

        let (_, body) = get(
            state(vec![], Some(cache)),
            "/deltas?interval=5m&symbol=ethusdt",
        )
        .await;
        let filtered: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(filtered.as_array().unwrap().len(), 1);
        assert_eq!(filtered[0]["delta"], 3.0);
    }
}
