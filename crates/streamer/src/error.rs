//! Error types for the streamer crate

use thiserror::Error;

use tickstream_codec::{DecodeError, EncodeError};
use tickstream_core::{ConnectionState, SubscriptionMode};
use tickstream_ports::TransportError;

/// Session-level errors
///
/// `Connection` and `Decode` are recovered inside the session (reconnect or
/// drop the frame) and only reported through `on_error`. The others are
/// returned to the caller or end the session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("Connection error: {0}")]
    Connection(#[from] TransportError),

    #[error("Authentication rejected ({code}): {reason}")]
    Authentication { code: u16, reason: String },

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Subscription limit exceeded for {mode}: {requested} requested, limit {limit}")]
    SubscriptionLimitExceeded {
        mode: SubscriptionMode,
        limit: usize,
        requested: usize,
    },

    #[error("Already connected (state {state})")]
    AlreadyConnected { state: ConnectionState },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FeedError {
    /// Returns true for errors the session recovers from on its own
    pub fn is_recoverable(&self) -> bool {
        matches!(self, FeedError::Connection(_) | FeedError::Decode(_))
    }
}

impl From<EncodeError> for FeedError {
    fn from(e: EncodeError) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
