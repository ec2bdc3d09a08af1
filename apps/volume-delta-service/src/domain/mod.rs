//! Domain Layer
//!
//! Exchange-agnostic volume accounting: identifiers, intervals and the bucket
//! store. Nothing in here performs I/O.

/// Accumulation intervals and calendar alignment.
pub mod interval;

/// Sources, symbols and normalized trade events.
pub mod market;

/// Per-(source, symbol, interval) volume buckets.
pub mod volume;
