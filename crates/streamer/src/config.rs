//! Streamer Configuration
//!
//! Timeouts, heartbeat and reconnection policy for a session. The endpoint
//! and access token are not part of it: they come from the connector and the
//! session constructor.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{FeedError, FeedResult};

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_heartbeat_timeout_ms() -> u64 {
    30_000
}

fn default_reconnect_delay_initial_ms() -> u64 {
    1_000
}

fn default_reconnect_delay_max_ms() -> u64 {
    30_000
}

fn default_reconnect_backoff_factor() -> f64 {
    2.0
}

fn default_reconnect_jitter_ms() -> u64 {
    250
}

fn default_auth_failure_limit() -> u32 {
    3
}

/// Session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamerConfig {
    /// Bound on socket establishment
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Bound on waiting for the auth acknowledgement
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,

    /// Ping interval
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Silence after which the link is considered dead (must exceed the ping interval)
    #[serde(default = "default_heartbeat_timeout_ms")]
    pub heartbeat_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_initial_ms")]
    pub reconnect_delay_initial_ms: u64,

    #[serde(default = "default_reconnect_delay_max_ms")]
    pub reconnect_delay_max_ms: u64,

    #[serde(default = "default_reconnect_backoff_factor")]
    pub reconnect_backoff_factor: f64,

    /// Upper bound of the random jitter added to each delay
    #[serde(default = "default_reconnect_jitter_ms")]
    pub reconnect_jitter_ms: u64,

    /// `None` retries forever
    #[serde(default)]
    pub reconnect_max_attempts: Option<u32>,

    /// Consecutive auth rejections tolerated before giving up
    #[serde(default = "default_auth_failure_limit")]
    pub auth_failure_limit: u32,

    /// Maximum keys per outbound request, if the feed caps message size
    #[serde(default)]
    pub max_instruments_per_message: Option<usize>,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            heartbeat_timeout_ms: default_heartbeat_timeout_ms(),
            reconnect_delay_initial_ms: default_reconnect_delay_initial_ms(),
            reconnect_delay_max_ms: default_reconnect_delay_max_ms(),
            reconnect_backoff_factor: default_reconnect_backoff_factor(),
            reconnect_jitter_ms: default_reconnect_jitter_ms(),
            reconnect_max_attempts: None,
            auth_failure_limit: default_auth_failure_limit(),
            max_instruments_per_message: None,
        }
    }
}

impl StreamerConfig {
    /// Load configuration from a JSON string (missing fields take defaults)
    pub fn from_json_str(json: &str) -> FeedResult<Self> {
        let config: StreamerConfig =
            serde_json::from_str(json).map_err(|e| FeedError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_auth_timeout(mut self, timeout: Duration) -> Self {
        self.auth_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set ping interval and staleness timeout together
    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self.heartbeat_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set initial delay, cap and multiplier of the reconnect backoff
    pub fn with_backoff(mut self, initial: Duration, max: Duration, factor: f64) -> Self {
        self.reconnect_delay_initial_ms = initial.as_millis() as u64;
        self.reconnect_delay_max_ms = max.as_millis() as u64;
        self.reconnect_backoff_factor = factor;
        self
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.reconnect_jitter_ms = jitter.as_millis() as u64;
        self
    }

    pub fn with_max_attempts(mut self, attempts: Option<u32>) -> Self {
        self.reconnect_max_attempts = attempts;
        self
    }

    pub fn with_auth_failure_limit(mut self, limit: u32) -> Self {
        self.auth_failure_limit = limit;
        self
    }

    pub fn with_max_instruments_per_message(mut self, max: Option<usize>) -> Self {
        self.max_instruments_per_message = max;
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> FeedResult<()> {
        let nonzero = [
            ("connect_timeout_ms", self.connect_timeout_ms),
            ("auth_timeout_ms", self.auth_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("heartbeat_timeout_ms", self.heartbeat_timeout_ms),
            ("reconnect_delay_initial_ms", self.reconnect_delay_initial_ms),
        ];
        for (name, value) in nonzero {
            if value == 0 {
                return Err(FeedError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.heartbeat_timeout_ms <= self.heartbeat_interval_ms {
            return Err(FeedError::Config(format!(
                "heartbeat_timeout_ms ({}) must exceed heartbeat_interval_ms ({})",
                self.heartbeat_timeout_ms, self.heartbeat_interval_ms
            )));
        }
        if self.reconnect_backoff_factor.is_nan() || self.reconnect_backoff_factor < 1.0 {
            return Err(FeedError::Config(format!(
                "reconnect_backoff_factor must be at least 1.0, got {}",
                self.reconnect_backoff_factor
            )));
        }
        if self.reconnect_delay_max_ms < self.reconnect_delay_initial_ms {
            return Err(FeedError::Config(format!(
                "reconnect_delay_max_ms ({}) is below reconnect_delay_initial_ms ({})",
                self.reconnect_delay_max_ms, self.reconnect_delay_initial_ms
            )));
        }
        if self.max_instruments_per_message == Some(0) {
            return Err(FeedError::Config(
                "max_instruments_per_message must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
