//! Heartbeat Monitor
//!
//! Tracks the last liveness signal (any inbound frame, including pongs and
//! server heartbeats) and decides when the link has gone silent for too long.
//! The session drives the ping interval and sleeps until [`deadline`].
//!
//! [`deadline`]: HeartbeatMonitor::deadline

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    timeout: Duration,
    last_seen: Instant,
    pings_sent: u64,
}

impl HeartbeatMonitor {
    /// Start monitoring now
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout,
            last_seen: Instant::now(),
            pings_sent: 0,
        }
    }

    /// Ping interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Record a liveness signal
    pub fn record(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn record_ping(&mut self) {
        self.pings_sent += 1;
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    /// Instant at which the link becomes stale if nothing arrives
    pub fn deadline(&self) -> Instant {
        self.last_seen + self.timeout
    }

    /// Time since the last liveness signal
    pub fn silence(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_seen)
    }

    pub fn is_stale(&self) -> bool {
        self.silence() >= self.timeout
    }
}
