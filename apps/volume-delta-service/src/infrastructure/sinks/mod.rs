//! Delta Sink Adapters
//!
//! Implementations of the [`DeltaSink`](crate::application::ports::DeltaSink)
//! port:
//!
//! - `LoggingSink`: one structured log line per delta
//! - `LatestDeltaCache`: latest delta per (source, symbol, interval), served at `/deltas`
//! - `BroadcastSink`: tokio broadcast fan-out to in-process subscribers
//! - `FanoutSink`: forwards every delta to several sinks

mod broadcast;
mod cache;
mod fanout;
mod logging;

pub use broadcast::BroadcastSink;
pub use cache::LatestDeltaCache;
pub use fanout::FanoutSink;
pub use logging::LoggingSink;
