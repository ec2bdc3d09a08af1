#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements,
        clippy::cast_precision_loss
    )
)]

//! Volume Delta Service - Buy/Sell Volume Accounting
//!
//! Ingests real-time trades from exchange WebSocket feeds and, for every
//! tracked symbol and calendar-aligned interval, reports the net traded
//! volume (buy volume minus sell volume) when the interval closes.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Accounting types with no I/O
//!   - `interval`: Supported intervals and boundary alignment
//!   - `market`: Sources, symbols and normalized trades
//!   - `volume`: The concurrent bucket store
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Delta sink and clock interfaces
//!   - `services`: Trade accumulator, flush coordinator, interval scheduler
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `exchanges`: Bybit and Binance trade feeds
//!   - `sinks`: Logging, cache, broadcast and fan-out delta sinks
//!   - `config`: Environment configuration
//!   - `health`: Health, metrics and delta HTTP endpoint
//!
//! # Data Flow
//!
//! ```text
//! Bybit WS ───┐
//!             │    ┌─────────────┐    ┌─────────────┐    ┌──────────┐
//!             ├───►│ Accumulator │───►│ Bucket Store│───►│  Flush   │──► Sink
//!             │    └─────────────┘    └─────────────┘    └──────────┘
//! Binance WS ─┘                                           ▲
//!                                    Interval Scheduler ──┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Volume accounting types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::interval::{Interval, ParseIntervalError};
pub use domain::market::{Side, Source, Symbol, TradeEvent};
pub use domain::volume::{
    ApplyOutcome, FlushRecord, StoreError, StoreStats, VolumeBucket, VolumeBucketStore,
};

// Application
pub use application::ports::{Clock, DeltaRecord, DeltaSink, NoOpSink, SinkError, SystemClock};
pub use application::services::{
    AccumulatorStats, FlushCoordinator, FlushReport, IntervalScheduler, SchedulerHandle,
    TradeAccumulator,
};

// Infrastructure config
pub use infrastructure::config::{
    AccountingSettings, ConfigError, Exchange, FeedSettings, ServerSettings, ServiceConfig,
    SinkKind, SinkSettings, WebSocketSettings,
};

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Sinks
pub use infrastructure::sinks::{BroadcastSink, FanoutSink, LatestDeltaCache, LoggingSink};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
