//! In-memory transport for single-process use and tests
//!
//! [`ChannelConnector`] hands each new connection's far end to a
//! [`ChannelListener`], which plays the feed server. Pings are answered
//! automatically (like a websocket server would) unless auto-pong is
//! switched off to simulate a silent peer.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use log::debug;
use tokio::sync::mpsc;

use tickstream_codec::FeedRequest;
use tickstream_ports::{
    CloseFrame, FeedConnection, FeedConnector, Frame, TransportError, TransportResult,
};

#[derive(Debug)]
struct ListenerControl {
    accepting: AtomicBool,
    auto_pong: AtomicBool,
    attempts: AtomicU32,
}

/// Client side: opens in-memory connections
#[derive(Debug, Clone)]
pub struct ChannelConnector {
    accept_tx: mpsc::UnboundedSender<ChannelPeer>,
    control: Arc<ListenerControl>,
}

impl ChannelConnector {
    /// Create a connector and the listener receiving its connections
    pub fn pair() -> (ChannelConnector, ChannelListener) {
        let (accept_tx, accept_rx) = mpsc::unbounded_channel();
        let control = Arc::new(ListenerControl {
            accepting: AtomicBool::new(true),
            auto_pong: AtomicBool::new(true),
            attempts: AtomicU32::new(0),
        });
        (
            ChannelConnector {
                accept_tx,
                control: Arc::clone(&control),
            },
            ChannelListener { accept_rx, control },
        )
    }
}

#[async_trait]
impl FeedConnector for ChannelConnector {
    async fn connect(&self) -> TransportResult<Box<dyn FeedConnection>> {
        let attempt = self.control.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.control.accepting.load(Ordering::SeqCst) {
            debug!("In-memory connect {} refused", attempt);
            return Err(TransportError::ConnectionFailed(
                "connection refused".to_string(),
            ));
        }

        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
        let (to_client_tx, to_client_rx) = mpsc::unbounded_channel();

        let connection = ChannelConnection {
            tx: Some(to_server_tx),
            rx: to_client_rx,
            pong: to_client_tx.downgrade(),
            control: Arc::clone(&self.control),
        };
        let peer = ChannelPeer {
            tx: to_client_tx,
            rx: to_server_rx,
        };

        self.accept_tx
            .send(peer)
            .map_err(|_| TransportError::ConnectionFailed("listener dropped".to_string()))?;
        Ok(Box::new(connection))
    }

    fn endpoint(&self) -> String {
        "memory".to_string()
    }
}

/// Server side: accepts connections opened through the paired connector
#[derive(Debug)]
pub struct ChannelListener {
    accept_rx: mpsc::UnboundedReceiver<ChannelPeer>,
    control: Arc<ListenerControl>,
}

impl ChannelListener {
    /// Wait for the next connection
    pub async fn accept(&mut self) -> Option<ChannelPeer> {
        self.accept_rx.recv().await
    }

    /// Refuse (`false`) or allow new connections
    pub fn set_accepting(&self, accepting: bool) {
        self.control.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Answer client pings automatically (default on)
    pub fn set_auto_pong(&self, enabled: bool) {
        self.control.auto_pong.store(enabled, Ordering::SeqCst);
    }

    /// Connection attempts seen so far, refused ones included
    pub fn connection_attempts(&self) -> u32 {
        self.control.attempts.load(Ordering::SeqCst)
    }
}

/// Far end of one in-memory connection
///
/// Dropping it without [`close`](Self::close) looks like an abnormal drop
/// to the client.
#[derive(Debug)]
pub struct ChannelPeer {
    tx: mpsc::UnboundedSender<Frame>,
    rx: mpsc::UnboundedReceiver<Frame>,
}

impl ChannelPeer {
    pub fn send(&self, frame: Frame) -> TransportResult<()> {
        self.tx
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    pub fn send_binary(&self, bytes: Vec<u8>) -> TransportResult<()> {
        self.send(Frame::Binary(bytes))
    }

    /// Next frame from the client; `None` once the client is gone
    pub async fn recv(&mut self) -> Option<Frame> {
        self.rx.recv().await
    }

    /// Next request from the client, skipping control and non-request frames
    pub async fn recv_request(&mut self) -> Option<FeedRequest> {
        loop {
            match self.rx.recv().await? {
                Frame::Binary(bytes) => match FeedRequest::from_slice(&bytes) {
                    Ok(request) => return Some(request),
                    Err(e) => debug!("Peer ignoring non-request frame: {}", e),
                },
                Frame::Close(_) => return None,
                _ => {}
            }
        }
    }

    /// Requests already queued by the client, without waiting
    pub fn drain_requests(&mut self) -> Vec<FeedRequest> {
        let mut requests = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            if let Frame::Binary(bytes) = frame {
                if let Ok(request) = FeedRequest::from_slice(&bytes) {
                    requests.push(request);
                }
            }
        }
        requests
    }

    /// Send a close frame and drop the connection
    pub fn close(self, code: u16, reason: &str) {
        let _ = self.tx.send(Frame::Close(Some(CloseFrame::new(code, reason))));
    }
}

struct ChannelConnection {
    /// `None` once closed locally
    tx: Option<mpsc::UnboundedSender<Frame>>,
    rx: mpsc::UnboundedReceiver<Frame>,
    /// Weak so a dropped peer still ends the stream
    pong: mpsc::WeakUnboundedSender<Frame>,
    control: Arc<ListenerControl>,
}

#[async_trait]
impl FeedConnection for ChannelConnection {
    async fn send(&mut self, frame: Frame) -> TransportResult<()> {
        let tx = self.tx.as_ref().ok_or(TransportError::ConnectionClosed)?;
        if let Frame::Ping(payload) = &frame {
            if self.control.auto_pong.load(Ordering::SeqCst) {
                if let Some(pong) = self.pong.upgrade() {
                    let _ = pong.send(Frame::Pong(payload.clone()));
                }
                return Ok(());
            }
        }
        tx.send(frame).map_err(|_| TransportError::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<TransportResult<Frame>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> TransportResult<()> {
        if let Some(tx) = self.tx.take() {
            let _ = tx.send(Frame::Close(frame));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tickstream_core::{InstrumentKey, SubscriptionMode};

    #[tokio::test]
    async fn test_frames_flow_both_ways() {
        let (connector, mut listener) = ChannelConnector::pair();
        let mut conn = connector.connect().await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        let request = FeedRequest::subscribe(SubscriptionMode::Ltpc, vec![InstrumentKey::new("A|1")]);
        conn.send(Frame::Binary(request.to_bytes().unwrap())).await.unwrap();
        assert_eq!(peer.recv_request().await, Some(request));

        peer.send_binary(vec![1, 2, 3]).unwrap();
        assert_eq!(conn.recv().await, Some(Ok(Frame::Binary(vec![1, 2, 3]))));
    }

    #[tokio::test]
    async fn test_auto_pong() {
        let (connector, mut listener) = ChannelConnector::pair();
        let mut conn = connector.connect().await.unwrap();
        let _peer = listener.accept().await.unwrap();

        conn.send(Frame::Ping(b"hb".to_vec())).await.unwrap();
        assert_eq!(conn.recv().await, Some(Ok(Frame::Pong(b"hb".to_vec()))));
    }

    #[tokio::test]
    async fn test_dropped_peer_ends_stream() {
        let (connector, mut listener) = ChannelConnector::pair();
        let mut conn = connector.connect().await.unwrap();
        drop(listener.accept().await.unwrap());

        conn.send(Frame::Ping(vec![])).await.unwrap();
        assert_eq!(conn.recv().await, None);
    }

    #[tokio::test]
    async fn test_refused_while_not_accepting() {
        let (connector, listener) = ChannelConnector::pair();
        listener.set_accepting(false);

        assert!(matches!(
            connector.connect().await,
            Err(TransportError::ConnectionFailed(_))
        ));
        assert_eq!(listener.connection_attempts(), 1);
    }

    #[tokio::test]
    async fn test_close_reaches_peer() {
        let (connector, mut listener) = ChannelConnector::pair();
        let mut conn = connector.connect().await.unwrap();
        let mut peer = listener.accept().await.unwrap();

        conn.close(Some(CloseFrame::normal())).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::Close(Some(CloseFrame::normal()))));
        assert_eq!(peer.recv().await, None);
        assert_eq!(
            conn.send(Frame::Text("late".into())).await,
            Err(TransportError::ConnectionClosed)
        );
    }
}
