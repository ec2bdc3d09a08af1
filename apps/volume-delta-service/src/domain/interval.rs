//! Accumulation Intervals
//!
//! The fixed set of granularities over which volume is accumulated before a
//! flush, and the calendar arithmetic that aligns flush ticks to them.
//!
//! Every period divides 24 hours, so aligning to multiples of the period
//! since the Unix epoch is the same as aligning to UTC wall-clock
//! boundaries: the 15-minute interval ticks at :00, :15, :30 and :45, the
//! 4-hour interval at 00:00, 04:00, ..., 20:00 and the 1-day interval at
//! midnight UTC.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An accumulation window granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Interval {
    /// Five minutes.
    #[serde(rename = "5m")]
    FiveMinutes,
    /// Fifteen minutes.
    #[serde(rename = "15m")]
    FifteenMinutes,
    /// Thirty minutes.
    #[serde(rename = "30m")]
    ThirtyMinutes,
    /// One hour.
    #[serde(rename = "1h")]
    OneHour,
    /// Four hours.
    #[serde(rename = "4h")]
    FourHours,
    /// One day.
    #[serde(rename = "1d")]
    OneDay,
}

impl Interval {
    /// Get all intervals, shortest first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::FiveMinutes,
            Self::FifteenMinutes,
            Self::ThirtyMinutes,
            Self::OneHour,
            Self::FourHours,
            Self::OneDay,
        ]
    }

    /// Get the short label (`5m`, `1h`, ...).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FiveMinutes => "5m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
        }
    }

    /// Length of the interval in seconds.
    #[must_use]
    pub const fn period_secs(self) -> i64 {
        match self {
            Self::FiveMinutes => 5 * 60,
            Self::FifteenMinutes => 15 * 60,
            Self::ThirtyMinutes => 30 * 60,
            Self::OneHour => 60 * 60,
            Self::FourHours => 4 * 60 * 60,
            Self::OneDay => 24 * 60 * 60,
        }
    }

    /// Length of the interval.
    #[must_use]
    pub const fn period(self) -> Duration {
        #[allow(clippy::cast_sign_loss)]
        let secs = self.period_secs() as u64;
        Duration::from_secs(secs)
    }

    /// The first boundary of this interval strictly after `now`.
    #[must_use]
    pub fn next_boundary(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let period = self.period_secs();
        let next = (now.timestamp().div_euclid(period) + 1) * period;
        DateTime::<Utc>::from_timestamp(next, 0).unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Time remaining from `now` until the next boundary.
    #[must_use]
    pub fn until_next_boundary(self, now: DateTime<Utc>) -> Duration {
        (self.next_boundary(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an interval label is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown interval: {0} (expected one of 5m, 15m, 30m, 1h, 4h, 1d)")]
pub struct ParseIntervalError(pub String);

impl FromStr for Interval {
    type Err = ParseIntervalError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "5m" => Ok(Self::FiveMinutes),
            "15m" => Ok(Self::FifteenMinutes),
            "30m" => Ok(Self::ThirtyMinutes),
            "1h" | "60m" => Ok(Self::OneHour),
            "4h" => Ok(Self::FourHours),
            "1d" | "24h" => Ok(Self::OneDay),
            _ => Err(ParseIntervalError(s.to_string())),
        }
    }
}
