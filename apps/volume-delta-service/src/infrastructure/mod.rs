//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete exchange feeds, delta sinks and the operational surface around
//! the accounting core.

/// Configuration loaded from the environment.
pub mod config;

/// Exchange WebSocket trade feeds (Bybit, Binance).
pub mod exchanges;

/// Health check, metrics and delta HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// Delta sink adapters.
pub mod sinks;

/// OpenTelemetry tracing integration.
pub mod telemetry;
