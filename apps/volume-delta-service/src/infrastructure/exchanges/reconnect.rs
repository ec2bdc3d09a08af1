//! Reconnection Policy
//!
//! Exponential backoff with proportional jitter for exchange WebSocket
//! reconnects. The delay for attempt `n` (1-based) is
//! `initial * multiplier^(n-1)`, capped at `max`, then jittered by up to
//! `±jitter_factor` of its value.

use std::time::Duration;

use rand::Rng;

use crate::infrastructure::config::WebSocketSettings;

/// Configuration for reconnection behavior.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Growth factor applied per attempt.
    pub multiplier: f64,
    /// Jitter as a fraction of the delay (0.1 = ±10%).
    pub jitter_factor: f64,
    /// Maximum number of attempts (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self::from(&WebSocketSettings::default())
    }
}

impl From<&WebSocketSettings> for ReconnectConfig {
    fn from(settings: &WebSocketSettings) -> Self {
        Self {
            initial_delay: settings.reconnect_delay_initial,
            max_delay: settings.reconnect_delay_max,
            multiplier: settings.reconnect_delay_multiplier,
            jitter_factor: 0.1,
            max_attempts: settings.max_reconnect_attempts,
        }
    }
}

/// Tracks consecutive reconnection attempts for one connection.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use volume_delta_service::infrastructure::exchanges::{ReconnectConfig, ReconnectPolicy};
///
/// let mut policy = ReconnectPolicy::new(ReconnectConfig {
///     initial_delay: Duration::from_millis(100),
///     jitter_factor: 0.0,
///     ..ReconnectConfig::default()
/// });
///
/// assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(100));
/// assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(200));
///
/// // A successful connection starts the sequence over
/// policy.reset();
/// assert_eq!(policy.next_delay().unwrap(), Duration::from_millis(100));
/// ```
#[derive(Debug)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
    attempts: u32,
}

impl ReconnectPolicy {
    /// Create a policy with no attempts made.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self {
            config,
            attempts: 0,
        }
    }

    /// Register another attempt and get the delay to wait before it.
    ///
    /// # Errors
    ///
    /// Returns [`ReconnectError::MaxAttemptsExceeded`] once the configured
    /// attempt budget is used up.
    pub fn next_delay(&mut self) -> Result<Duration, ReconnectError> {
        if self.config.max_attempts > 0 && self.attempts >= self.config.max_attempts {
            return Err(ReconnectError::MaxAttemptsExceeded(self.config.max_attempts));
        }

        let delay = self.base_delay(self.attempts);
        self.attempts += 1;
        Ok(self.jitter(delay))
    }

    /// Forget previous attempts after a successful connection.
    pub const fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Number of attempts since the last reset.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Un-jittered delay for the attempt following `previous` attempts.
    fn base_delay(&self, previous: u32) -> Duration {
        let exponent = i32::try_from(previous).unwrap_or(i32::MAX);
        let factor = self.config.multiplier.max(1.0).powi(exponent);
        let max_secs = self.config.max_delay.as_secs_f64();
        let secs = (self.config.initial_delay.as_secs_f64() * factor).min(max_secs);

        if secs.is_finite() {
            Duration::from_secs_f64(secs.max(0.0))
        } else {
            self.config.max_delay
        }
    }

    fn jitter(&self, delay: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if factor <= 0.0 || delay.is_zero() {
            return delay;
        }

        let spread = delay.as_secs_f64() * factor;
        let offset: f64 = rand::rng().random_range(-spread..=spread);
        Duration::from_secs_f64((delay.as_secs_f64() + offset).max(0.001))
    }
}

/// Reconnection errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconnectError {
    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts ({0}) exceeded")]
    MaxAttemptsExceeded(u32),
}
