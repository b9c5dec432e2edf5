//! WebSocket transport (tokio-tungstenite)

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use log::{debug, trace};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as WsCloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use url::Url;

use tickstream_ports::{
    CloseFrame, FeedConnection, FeedConnector, Frame, TransportError, TransportResult,
};

/// Opens websocket connections to an authorized feed URL
///
/// The URL comes from the authorization layer and may carry a one-time code
/// in its query string, so only scheme, host and path are ever logged.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: Url,
}

impl WebSocketConnector {
    pub fn new(endpoint: &str) -> TransportResult<Self> {
        let url =
            Url::parse(endpoint).map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(TransportError::InvalidEndpoint(format!(
                    "unsupported scheme '{}'",
                    other
                )));
            }
        }
        if url.host_str().is_none() {
            return Err(TransportError::InvalidEndpoint("missing host".to_string()));
        }
        Ok(Self { url })
    }
}

#[async_trait]
impl FeedConnector for WebSocketConnector {
    async fn connect(&self) -> TransportResult<Box<dyn FeedConnection>> {
        let (stream, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;
        debug!(
            "WebSocket handshake with {} complete ({})",
            self.endpoint(),
            response.status()
        );
        Ok(Box::new(WebSocketConnection { stream }))
    }

    fn endpoint(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}://{}:{}{}", self.url.scheme(), host, port, self.url.path()),
            None => format!("{}://{}{}", self.url.scheme(), host, self.url.path()),
        }
    }
}

struct WebSocketConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl FeedConnection for WebSocketConnection {
    async fn send(&mut self, frame: Frame) -> TransportResult<()> {
        self.stream
            .send(to_message(frame))
            .await
            .map_err(|e| map_error(e, TransportError::Send))
    }

    async fn recv(&mut self) -> Option<TransportResult<Frame>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Frame(_)) => trace!("Skipping raw frame"),
                Ok(message) => return Some(Ok(from_message(message))),
                Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(map_error(e, TransportError::Receive))),
            }
        }
    }

    async fn close(&mut self, frame: Option<CloseFrame>) -> TransportResult<()> {
        let frame = frame.map(|f| WsCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.into(),
        });
        match self.stream.close(frame).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(map_error(e, TransportError::Send)),
        }
    }
}

fn to_message(frame: Frame) -> Message {
    match frame {
        Frame::Binary(data) => Message::Binary(data.into()),
        Frame::Text(text) => Message::Text(text.into()),
        Frame::Ping(data) => Message::Ping(data.into()),
        Frame::Pong(data) => Message::Pong(data.into()),
        Frame::Close(close) => Message::Close(close.map(|f| WsCloseFrame {
            code: CloseCode::from(f.code),
            reason: f.reason.into(),
        })),
    }
}

fn from_message(message: Message) -> Frame {
    match message {
        Message::Binary(data) => Frame::Binary(data.to_vec()),
        Message::Text(text) => Frame::Text(text.as_str().to_string()),
        Message::Ping(data) => Frame::Ping(data.to_vec()),
        Message::Pong(data) => Frame::Pong(data.to_vec()),
        Message::Close(close) => Frame::Close(close.map(|f| CloseFrame {
            code: u16::from(f.code),
            reason: f.reason.as_str().to_string(),
        })),
        Message::Frame(frame) => Frame::Binary(frame.into_payload().to_vec()),
    }
}

fn map_error(err: WsError, wrap: fn(String) -> TransportError) -> TransportError {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::ConnectionClosed,
        WsError::Io(e) => TransportError::from(e),
        other => wrap(other.to_string()),
    }
}
