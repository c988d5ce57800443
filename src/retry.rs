//! Reconnect backoff.
//!
//! Connections that lose their master re-resolve it through the sentinels.
//! During a failover the sentinels may briefly have no master to offer, so
//! the lookup is repeated on a growing delay schedule.
//!
//! [`RetryConfig`] is the user-facing knob. [`Backoff`] turns it into the
//! concrete delays for one run of lookups; the caller owns the loop so it can
//! also watch for shutdown while waiting.
//!
//! # Schedule
//!
//! - Base delay starts at `initial_delay` and is multiplied after each wait
//! - Base delay is capped at `max_delay`
//! - Each wait is a random point in the upper half of the base delay, so the
//!   nodes of a cluster spread their lookups and never exceed the cap

#![cfg_attr(not(feature = "transport_redis"), allow(dead_code))]

use rand::Rng;
use std::time::Duration;

/// Retry configuration with exponential backoff.
///
/// # Example
///
/// ```
/// use meshbus::RetryConfig;
/// use std::time::Duration;
///
/// let retry = RetryConfig {
///     max_attempts: 10,
///     multiplier: 2.0,
///     initial_delay: Duration::from_millis(250),
///     max_delay: Duration::from_secs(5),
/// };
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (0 = no retries, just the initial attempt).
    pub max_attempts: u32,

    /// Backoff multiplier applied to the delay after each retry.
    pub multiplier: f32,

    /// Initial delay before the first retry.
    pub initial_delay: Duration,

    /// Maximum delay between retry attempts.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    /// - `max_attempts`: 10
    /// - `multiplier`: 2.0
    /// - `initial_delay`: 500ms
    /// - `max_delay`: 5s
    fn default() -> Self {
        // ---
        Self {
            max_attempts: 10,
            multiplier: 2.0,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Delay schedule for one run of attempts.
#[derive(Debug)]
pub(crate) struct Backoff {
    // ---
    max_attempts: u32,
    multiplier: f64,
    max_delay: Duration,
    retries: u32,
    base: Duration,
}

impl Backoff {
    // ---

    pub(crate) fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            multiplier: config.multiplier as f64,
            max_delay: config.max_delay,
            retries: 0,
            base: config.initial_delay.min(config.max_delay),
        }
    }

    /// Delay before the next attempt, or `None` once every retry is used.
    pub(crate) fn next_delay(&mut self) -> Option<Duration> {
        // ---
        if self.retries >= self.max_attempts {
            return None;
        }
        self.retries += 1;

        let delay = spread(self.base);
        self.base = self.base.mul_f64(self.multiplier).min(self.max_delay);

        Some(delay)
    }

    /// Retries handed out so far.
    pub(crate) fn retries(&self) -> u32 {
        self.retries
    }
}

/// A random point in `base/2 ..= base`.
fn spread(base: Duration) -> Duration {
    base.mul_f64(rand::thread_rng().gen_range(0.5..=1.0))
}
