//! Application Ports (Driven)
//!
//! Interfaces the application services use to reach outside the core.
//! - **Delta sink**: where computed volume deltas are recorded
//! - **Clock**: wall-clock time used for calendar-aligned scheduling

mod clock_port;
mod delta_sink_port;

pub use clock_port::{Clock, SystemClock};
pub use delta_sink_port::{DeltaRecord, DeltaSink, NoOpSink, SinkError};
