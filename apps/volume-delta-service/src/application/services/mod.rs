//! Application Services
//!
//! Long-running pieces of the accounting core: trade ingestion into the
//! bucket store and the scheduled flushes out of it.

mod accumulator;
mod flush;
mod scheduler;

pub use accumulator::{AccumulatorStats, TradeAccumulator};
pub use flush::{FlushCoordinator, FlushReport};
pub use scheduler::{IntervalScheduler, SchedulerHandle};
