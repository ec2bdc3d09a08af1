//! Clock Port (Driven Port)
//!
//! Wall-clock source for calendar-aligned flush scheduling.

use chrono::{DateTime, Utc};

/// Port for reading the current UTC time.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
