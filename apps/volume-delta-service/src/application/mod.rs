//! Application Layer
//!
//! Orchestrates the volume accounting core through:
//!
//! - **Ports**: the delta sink and clock interfaces the services depend on
//! - **Services**: the trade accumulator, the flush coordinator and the
//!   per-interval scheduler

pub mod ports;
pub mod services;

pub use ports::*;
pub use services::*;
