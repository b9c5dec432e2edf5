use serde::{Deserialize, Serialize};

/// Lifecycle state of a streaming session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// Never connected
    Disconnected,
    /// Establishing the socket
    Connecting,
    /// Socket open, waiting for the auth acknowledgement
    Authenticating,
    /// Authenticated and streaming
    Connected,
    /// Link lost, waiting out the backoff delay
    Reconnecting,
    /// Terminal: no further reconnection attempts
    Closed,
}

impl ConnectionState {
    /// Returns true if `connect()` may start a new session from this state
    pub fn can_connect(&self) -> bool {
        matches!(self, ConnectionState::Disconnected | ConnectionState::Closed)
    }

    /// Returns true if the session loop may move from `self` to `next`
    ///
    /// `disconnect()` is the exception: it closes from any state and does not
    /// go through this table.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected | Closed, Connecting)
                | (Connecting, Authenticating | Reconnecting)
                | (Authenticating, Connected | Reconnecting)
                | (Connected, Reconnecting)
                | (Reconnecting, Connecting | Closed)
        )
    }

    /// Returns true for the terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Authenticating => "AUTHENTICATING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Reconnecting => "RECONNECTING",
            ConnectionState::Closed => "CLOSED",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why an established connection ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisconnectKind {
    /// `disconnect()` was called
    ClientRequested,
    /// Peer sent a close frame
    RemoteClosed,
    /// Read/write failure or the stream ended without a close frame
    TransportError,
    /// No liveness signal within the heartbeat timeout
    HeartbeatTimeout,
}

/// Disconnect details handed to the `on_disconnect` callback
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReason {
    pub kind: DisconnectKind,
    /// Close code, when the peer sent one
    pub code: Option<u16>,
    pub message: String,
}

impl DisconnectReason {
    /// Normal closure code
    pub const NORMAL_CLOSURE: u16 = 1000;
    /// Abnormal closure code (no close frame received)
    pub const ABNORMAL_CLOSURE: u16 = 1006;

    pub fn client_requested() -> Self {
        Self {
            kind: DisconnectKind::ClientRequested,
            code: Some(Self::NORMAL_CLOSURE),
            message: "client requested disconnect".to_string(),
        }
    }

    pub fn remote_closed(code: Option<u16>, message: impl Into<String>) -> Self {
        Self {
            kind: DisconnectKind::RemoteClosed,
            code,
            message: message.into(),
        }
    }

    pub fn transport_error(message: impl Into<String>) -> Self {
        Self {
            kind: DisconnectKind::TransportError,
            code: Some(Self::ABNORMAL_CLOSURE),
            message: message.into(),
        }
    }

    pub fn heartbeat_timeout(silent_for_ms: u128) -> Self {
        Self {
            kind: DisconnectKind::HeartbeatTimeout,
            code: Some(Self::ABNORMAL_CLOSURE),
            message: format!("no liveness signal for {}ms", silent_for_ms),
        }
    }

    /// Returns true if the session should try to reconnect after this
    pub fn should_reconnect(&self) -> bool {
        !matches!(self.kind, DisconnectKind::ClientRequested)
    }
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.code {
            Some(code) => write!(f, "{:?} ({}): {}", self.kind, code, self.message),
            None => write!(f, "{:?}: {}", self.kind, self.message),
        }
    }
}
