//! Typed configuration for the service, the clerk's retry schedule, and the
//! lock's poll interval. Every field has a concrete default; there is no
//! on-disk config loading in this core.

use serde_derive::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for [`crate::service::KvService`] construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KvConfig {
    /// Whether the transport simulates drops at all.
    pub unreliable: bool,

    /// Independent Bernoulli(p) drop probability applied to each direction
    /// of a request/reply pair.
    pub drop_probability: f64,
}

impl Default for KvConfig {
    fn default() -> Self {
        KvConfig { unreliable: false, drop_probability: 0.0 }
    }
}

impl KvConfig {
    /// An unreliable transport with the given drop probability.
    pub fn unreliable(drop_probability: f64) -> Self {
        KvConfig { unreliable: true, drop_probability }
    }
}

/// Retry schedule for [`crate::clerk::Clerk`].
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts per logical operation before giving up.
    pub max_attempts: u32,

    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Multiplicative growth applied to the delay after each attempt.
    pub backoff_factor: f64,

    /// Upper bound on the backoff delay, regardless of growth.
    pub max_delay: Duration,

    /// Whether to scale the computed backoff delay by a uniform draw in
    /// `[0, 1)`, so the actual delay lands somewhere in `[0, delay)`
    /// rather than always being exactly `delay`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_attempts: 10,
            base_delay: Duration::from_millis(10),
            backoff_factor: 2.0,
            max_delay: Duration::from_millis(500),
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// The backoff delay before the given zero-indexed attempt's retry.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * self.backoff_factor.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());
        let base = Duration::from_secs_f64(capped.max(0.0));
        if self.jitter {
            use rand::Rng;
            let jittered: f64 = rand::thread_rng().gen_range(0.0..1.0);
            Duration::from_secs_f64(base.as_secs_f64() * jittered)
        } else {
            base
        }
    }
}

/// Configuration for [`crate::lock::Lock::acquire`]'s internal poll loop.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How long to sleep between contention-retry iterations of Acquire.
    pub poll_interval: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig { poll_interval: Duration::from_millis(20) }
    }
}
