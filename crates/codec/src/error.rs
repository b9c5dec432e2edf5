//! Error types for the codec crate

use thiserror::Error;

use crate::wire::MessageKind;

/// Per-frame decoding failure
///
/// Never fatal to a stream: the caller drops the frame and moves on.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("Truncated frame: {0}")]
    Truncated(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(u8),

    #[error("Unsupported schema version {version} for {kind:?}")]
    UnsupportedVersion { kind: MessageKind, version: u8 },

    #[error("Malformed payload: {0}")]
    Malformed(String),

    #[error("Invalid value for {field}: {value}")]
    InvalidField { field: &'static str, value: String },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}

impl DecodeError {
    /// Returns true when the frame is well-formed but of a type this client
    /// does not understand (skip and report, rather than a corrupt frame)
    pub fn is_unknown_message_type(&self) -> bool {
        matches!(
            self,
            DecodeError::UnknownMessageType(_) | DecodeError::UnsupportedVersion { .. }
        )
    }
}

impl From<bincode::Error> for DecodeError {
    fn from(err: bincode::Error) -> Self {
        match *err {
            bincode::ErrorKind::Io(ref io) if io.kind() == std::io::ErrorKind::UnexpectedEof => {
                DecodeError::Truncated("payload ended early".to_string())
            }
            ref other => DecodeError::Malformed(other.to_string()),
        }
    }
}

/// Encoding failure (feed simulators and outbound requests)
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Serialization failed: {0}")]
    Serialization(String),

    #[error("Price not representable on the wire: {0}")]
    InvalidPrice(String),
}

impl From<bincode::Error> for EncodeError {
    fn from(err: bincode::Error) -> Self {
        EncodeError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for EncodeError {
    fn from(err: serde_json::Error) -> Self {
        EncodeError::Serialization(err.to_string())
    }
}

pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
