use thiserror::Error;

/// Transport-level errors
///
/// Every variant is recoverable from the session's point of view: the
/// reconnection state machine decides what happens next.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Timeout")]
    Timeout,

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err.to_string())
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;
