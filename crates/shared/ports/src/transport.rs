use async_trait::async_trait;

use crate::error::TransportResult;
use crate::frame::{CloseFrame, Frame};

/// Port for opening feed connections
///
/// Supplied by the layer that owns the access credential and the endpoint
/// URL. Each call yields a fresh, ready-to-use connection; the session calls
/// it again on every reconnect.
#[async_trait]
pub trait FeedConnector: Send + Sync {
    /// Open a new connection
    async fn connect(&self) -> TransportResult<Box<dyn FeedConnection>>;

    /// Endpoint description for logging (never includes credentials)
    fn endpoint(&self) -> String {
        "feed".to_string()
    }
}

/// Port for one physical bidirectional connection
///
/// Owned by exactly one session task, so no method needs interior locking.
/// `recv` must be cancel-safe: the session polls it inside `select!`.
#[async_trait]
pub trait FeedConnection: Send {
    /// Write one frame
    async fn send(&mut self, frame: Frame) -> TransportResult<()>;

    /// Wait for the next frame. `None` means the stream ended.
    async fn recv(&mut self) -> Option<TransportResult<Frame>>;

    /// Close the connection, sending a close frame if the transport has one
    async fn close(&mut self, frame: Option<CloseFrame>) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure traits are object-safe
    fn _assert_connector_object_safe(_: &dyn FeedConnector) {}
    fn _assert_connection_object_safe(_: &mut dyn FeedConnection) {}
}
