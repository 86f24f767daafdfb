//! Adaptive retry delay shared by the page and image fetch loops.
//!
//! A [`Backoff`] owns a single delay (in seconds) bounded to
//! `[min, max]`.  Failures grow it multiplicatively, successes relax it
//! gently, and slow-but-successful responses can pull it upward so the
//! client paces itself to the server instead of hammering it.

use std::time::Duration;

/// Growth factor applied by [`Backoff::increment`] (2^0.5).
pub const INCREMENT_FACTOR: f64 = std::f64::consts::SQRT_2;

/// Decay factor applied by [`Backoff::relax`] (2^-0.1).
pub const RELAX_FACTOR: f64 = 0.933_032_991_536_807_4;

/// Latencies at or below this many seconds never raise the delay.
pub const SLOW_RESPONSE_SECS: f64 = 1.0;

/// Tunable bounds for a [`Backoff`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    /// Seed delay restored by [`Backoff::reset`].
    pub initial_secs: f64,
    /// Lower bound on the delay.
    pub min_secs: f64,
    /// Upper bound on the delay.
    pub max_secs: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_secs: 1.0,
            min_secs: 0.5,
            max_secs: 32.0,
        }
    }
}

impl BackoffConfig {
    /// Bounds with the default seed of one second.
    pub fn with_bounds(min_secs: f64, max_secs: f64) -> Self {
        Self {
            min_secs,
            max_secs,
            ..Default::default()
        }
    }
}

/// Adaptive delay clamped to `[min, max]` after every mutation.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: BackoffConfig,
    current: f64,
}

impl Backoff {
    pub fn new(config: BackoffConfig) -> Self {
        let current = clamp(config.initial_secs, config.min_secs, config.max_secs);
        Self { config, current }
    }

    /// Current delay in seconds.
    pub fn current(&self) -> f64 {
        self.current
    }

    /// Current delay as a sleepable [`Duration`].
    pub fn delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.current).unwrap_or(Duration::ZERO)
    }

    /// Grow the delay after a failed attempt.
    pub fn increment(&mut self) {
        self.set(self.current * INCREMENT_FACTOR);
    }

    /// Shrink the delay after a successful attempt.
    pub fn relax(&mut self) {
        self.set(self.current * RELAX_FACTOR);
    }

    /// Feed the wall-clock latency of a successful call back in.
    ///
    /// A response slower than both one second and the current delay
    /// moves the delay halfway toward that latency; anything faster
    /// relaxes it.
    pub fn observe(&mut self, latency: Duration) {
        let latency = latency.as_secs_f64();
        if latency > SLOW_RESPONSE_SECS && latency > self.current {
            self.set((latency + self.current) / 2.0);
        } else {
            self.relax();
        }
    }

    /// Restore the seed delay.
    pub fn reset(&mut self) {
        self.set(self.config.initial_secs);
    }

    fn set(&mut self, value: f64) {
        self.current = clamp(value, self.config.min_secs, self.config.max_secs);
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(BackoffConfig::default())
    }
}

/// `max(min, min(max, value))`, without `f64::clamp`'s panic on
/// inverted bounds.
fn clamp(value: f64, min: f64, max: f64) -> f64 {
    value.min(max).max(min)
}
