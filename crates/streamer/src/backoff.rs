//! Reconnect backoff
//!
//! Exponential delay with additive random jitter, capped at a maximum. The
//! sequence handed out between two resets never decreases, jitter included.

use std::time::Duration;

use rand::Rng;

use crate::config::StreamerConfig;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    jitter: Duration,
    attempt: u32,
    last: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, factor: f64, jitter: Duration) -> Self {
        Self {
            initial,
            max,
            factor,
            jitter,
            attempt: 0,
            last: Duration::ZERO,
        }
    }

    pub fn from_config(config: &StreamerConfig) -> Self {
        Self::new(
            Duration::from_millis(config.reconnect_delay_initial_ms),
            Duration::from_millis(config.reconnect_delay_max_ms),
            config.reconnect_backoff_factor,
            Duration::from_millis(config.reconnect_jitter_ms),
        )
    }

    /// Delays handed out since the last reset
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let exponent = self.attempt.min(63) as i32;
        let base_ms = self.initial.as_millis() as f64 * self.factor.powi(exponent);
        let max_ms = self.max.as_millis() as f64;

        let jitter_ms = match self.jitter.as_millis() as u64 {
            0 => 0,
            bound => rand::thread_rng().gen_range(0..=bound),
        };

        let delay_ms = (base_ms.min(max_ms) + jitter_ms as f64).min(max_ms);
        let delay = Duration::from_millis(delay_ms as u64).max(self.last);

        self.attempt = self.attempt.saturating_add(1);
        self.last = delay;
        delay
    }

    /// Back to the initial delay (after a successful connection)
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.last = Duration::ZERO;
    }
}
