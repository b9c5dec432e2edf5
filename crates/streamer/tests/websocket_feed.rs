//! WebSocket transport tests
//!
//! A minimal feed server on a loopback socket: acknowledges auth, checks the
//! subscription replay and pushes binary tick frames.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{WebSocketStream, accept_async};

use tickstream_codec::{
    ControlMessage, FeedRequest, MessageKind, RequestMethod, SCHEMA_V2, encode_control,
    encode_ticks,
};
use tickstream_core::{ConnectionState, InstrumentKey, SubscriptionMode, Tick};
use tickstream_streamer::{Callbacks, MarketDataStreamer, StreamerConfig, WebSocketConnector};

// ============================================================================
// Feed Server Helpers
// ============================================================================

const WAIT: Duration = Duration::from_secs(5);

async fn accept_feed(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (tcp, _) = timeout(WAIT, listener.accept())
        .await
        .expect("no client connected")
        .unwrap();
    accept_async(tcp).await.unwrap()
}

async fn next_request(ws: &mut WebSocketStream<TcpStream>) -> FeedRequest {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("no request from client")
            .expect("client went away")
            .unwrap();
        if let Message::Binary(bytes) = message {
            return FeedRequest::from_slice(&bytes).unwrap();
        }
    }
}

async fn acknowledge(ws: &mut WebSocketStream<TcpStream>) {
    let auth = next_request(ws).await;
    assert_eq!(auth.method, RequestMethod::Auth);
    assert_eq!(auth.data.token.as_deref(), Some("ws-token"));

    let ack = encode_control(&ControlMessage::AuthAck {
        session_id: "ws-session".to_string(),
    })
    .unwrap();
    ws.send(Message::Binary(ack.into())).await.unwrap();
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_ticks_flow_and_subscriptions_survive_server_restart() {
    let _ = env_logger::try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (tick_tx, mut tick_rx) = mpsc::unbounded_channel();
    let callbacks = Callbacks::new().on_tick(move |tick| {
        let _ = tick_tx.send(tick);
    });
    let connector =
        WebSocketConnector::new(&format!("ws://{}/feed/v3?code=one-time", addr)).unwrap();
    let config = StreamerConfig::default()
        .with_backoff(Duration::from_millis(50), Duration::from_millis(500), 2.0)
        .with_jitter(Duration::ZERO);
    let streamer =
        MarketDataStreamer::new(config, "ws-token", Arc::new(connector), Arc::new(callbacks))
            .unwrap();

    let subscribed = vec![
        InstrumentKey::new("NSE_EQ|INE002A01018"),
        InstrumentKey::new("NSE_EQ|INE467B01029"),
    ];
    streamer.subscribe(&subscribed, SubscriptionMode::Full).unwrap();
    streamer.connect().unwrap();

    let mut ws = accept_feed(&listener).await;
    acknowledge(&mut ws).await;
    let replay = next_request(&mut ws).await;
    assert_eq!(replay.method, RequestMethod::Sub);
    assert_eq!(replay.data.mode, Some(SubscriptionMode::Full));
    assert_eq!(replay.instrument_keys(), subscribed.as_slice());

    let at = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
    let tick = Tick::ltpc(subscribed[0].clone(), dec!(2950.55), 10, dec!(2931.1), at);
    let frame = encode_ticks(MessageKind::LiveFeed, SCHEMA_V2, at, &[tick.clone()]).unwrap();
    ws.send(Message::Binary(frame.into())).await.unwrap();

    let received = timeout(WAIT, tick_rx.recv()).await.unwrap().unwrap();
    assert_eq!(received, tick);
    assert!(streamer.is_connected());

    // Server restart: going-away close, then a fresh handshake
    ws.close(Some(CloseFrame {
        code: CloseCode::Away,
        reason: "restart".into(),
    }))
    .await
    .unwrap();
    drop(ws);

    let mut ws = accept_feed(&listener).await;
    acknowledge(&mut ws).await;
    let replay = next_request(&mut ws).await;
    assert_eq!(replay.instrument_keys(), subscribed.as_slice());

    streamer.shutdown().await;
    assert_eq!(streamer.state(), ConnectionState::Closed);
}

#[tokio::test]
async fn test_refused_connection_is_retried() {
    let _ = env_logger::try_init();
    // Reserve a port, then release it so the first attempt is refused
    let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let (attempt_tx, mut attempt_rx) = mpsc::unbounded_channel();
    let callbacks = Callbacks::new().on_reconnecting(move |attempt, _| {
        let _ = attempt_tx.send(attempt);
    });
    let connector = WebSocketConnector::new(&format!("ws://{}/feed", addr)).unwrap();
    let config = StreamerConfig::default()
        .with_backoff(Duration::from_millis(20), Duration::from_millis(100), 2.0)
        .with_jitter(Duration::ZERO);
    let streamer =
        MarketDataStreamer::new(config, "ws-token", Arc::new(connector), Arc::new(callbacks))
            .unwrap();
    streamer.connect().unwrap();

    let first = timeout(WAIT, attempt_rx.recv()).await.unwrap();
    assert_eq!(first, Some(1));

    let listener = TcpListener::bind(addr).await.unwrap();
    let mut ws = accept_feed(&listener).await;
    acknowledge(&mut ws).await;

    let mut state = streamer.state_watch();
    let connected = timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Connected)).await;
    assert!(matches!(connected, Ok(Ok(_))));
    drop(connected);

    streamer.shutdown().await;
}
