//! Session task: connect, authenticate, replay, stream, back off, repeat

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep, sleep_until, timeout};

use tickstream_codec::{ControlMessage, FeedMessage, FeedRequest, decode};
use tickstream_core::{ConnectionState, DisconnectReason};
use tickstream_ports::{CloseFrame, FeedConnection, FeedConnector, Frame, TransportError};

use super::Shared;
use crate::backoff::ExponentialBackoff;
use crate::config::StreamerConfig;
use crate::dispatch::Dispatcher;
use crate::error::FeedError;
use crate::heartbeat::HeartbeatMonitor;

/// Work handed from the caller to the session's write path
#[derive(Debug)]
pub(crate) enum Command {
    Send(FeedRequest),
}

/// How one connection attempt ended
enum Attempt {
    /// `disconnect()` was called
    Shutdown,
    /// Never reached CONNECTED
    Failed(FeedError),
    /// The feed refused the credential
    AuthRejected { code: u16, reason: String },
    /// Reached CONNECTED, later lost the link
    Lost(DisconnectReason),
}

enum AuthFailure {
    Shutdown,
    Rejected { code: u16, reason: String },
    Failed(FeedError),
}

/// How the streaming loop ended
enum StreamEnd {
    Lost(DisconnectReason),
    Shutdown,
}

/// One wake-up of the streaming loop
enum Event {
    Frame(Option<Result<Frame, TransportError>>),
    Command(Option<Command>),
    Ping,
    Stale,
    Shutdown,
}

/// Why a bounded write gave up
enum WriteStall {
    Failed(TransportError),
    Deadline,
    Shutdown,
}

type Connection = Box<dyn FeedConnection>;

/// Upper bound on releasing a socket
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

pub(crate) struct SessionRunner {
    pub(super) generation: u64,
    pub(super) config: StreamerConfig,
    pub(super) access_token: String,
    pub(super) connector: Arc<dyn FeedConnector>,
    pub(super) dispatcher: Dispatcher,
    pub(super) shared: Arc<Shared>,
    pub(super) commands: mpsc::UnboundedReceiver<Command>,
    pub(super) shutdown: watch::Receiver<bool>,
}

/// Resolves once shutdown is requested (or the handle is gone)
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

impl SessionRunner {
    fn transition(&self, to: ConnectionState) -> bool {
        self.shared.transition(self.generation, to)
    }

    fn shutdown_flagged(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Connect, stream and back off until the run ends in CLOSED
    ///
    /// Giving up (attempt budget spent or credentials rejected too often)
    /// always passes through RECONNECTING. Leaving because `disconnect()` was
    /// called reports a client-requested disconnect, whatever the state.
    pub(crate) async fn run(mut self) {
        let mut backoff = ExponentialBackoff::from_config(&self.config);
        let mut attempts: u32 = 0;
        let mut auth_failures: u32 = 0;

        let requested = loop {
            if self.shutdown_flagged() {
                break true;
            }

            let mut gave_up = None;
            match self.attempt().await {
                Attempt::Shutdown => break true,
                Attempt::Lost(reason) => {
                    warn!("Feed connection lost: {}", reason);
                    self.dispatcher.disconnect(&reason);
                    backoff.reset();
                    attempts = 0;
                    auth_failures = 0;
                }
                Attempt::Failed(err) => {
                    warn!("Connection attempt failed: {}", err);
                    self.dispatcher.error(&err);
                }
                Attempt::AuthRejected { code, reason } => {
                    auth_failures += 1;
                    let err = FeedError::Authentication { code, reason };
                    error!(
                        "{} ({} of {} allowed)",
                        err, auth_failures, self.config.auth_failure_limit
                    );
                    self.dispatcher.error(&err);
                    if auth_failures >= self.config.auth_failure_limit {
                        gave_up = Some(format!("{} rejected handshakes", auth_failures));
                    }
                }
            }

            if !self.transition(ConnectionState::Reconnecting) {
                break true;
            }

            if gave_up.is_none()
                && self
                    .config
                    .reconnect_max_attempts
                    .is_some_and(|max| attempts >= max)
            {
                let err = FeedError::Connection(TransportError::ConnectionFailed(format!(
                    "gave up after {} reconnect attempts",
                    attempts
                )));
                self.dispatcher.error(&err);
                gave_up = Some(format!("{} reconnect attempts", attempts));
            }
            if let Some(spent) = gave_up {
                error!("Giving up after {}", spent);
                self.transition(ConnectionState::Closed);
                break false;
            }

            attempts += 1;
            self.shared.set_reconnect_attempt(attempts);
            let delay = backoff.next_delay();
            info!(
                "Reconnect attempt {} of {} in {}ms",
                attempts,
                self.config
                    .reconnect_max_attempts
                    .map_or_else(|| "unlimited".to_string(), |m| m.to_string()),
                delay.as_millis()
            );
            self.dispatcher.reconnecting(attempts, delay);

            tokio::select! {
                _ = sleep(delay) => {}
                _ = shutdown_requested(&mut self.shutdown) => break true,
            }

            if !self.transition(ConnectionState::Connecting) {
                break true;
            }
        };

        if requested {
            self.dispatcher.disconnect(&DisconnectReason::client_requested());
        }
        debug!("Session run {} finished", self.generation);
    }

    async fn attempt(&mut self) -> Attempt {
        info!("Connecting to {}", self.connector.endpoint());
        let mut conn = tokio::select! {
            result = timeout(self.config.connect_timeout(), self.connector.connect()) => match result {
                Ok(Ok(conn)) => conn,
                Ok(Err(e)) => return Attempt::Failed(FeedError::Connection(e)),
                Err(_) => return Attempt::Failed(FeedError::Connection(TransportError::Timeout)),
            },
            _ = shutdown_requested(&mut self.shutdown) => return Attempt::Shutdown,
        };

        if !self.transition(ConnectionState::Authenticating) {
            close_quietly(&mut conn).await;
            return Attempt::Shutdown;
        }

        // Requests queued for a previous connection are covered by the replay
        let mut stale = 0;
        while self.commands.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            debug!("Dropped {} queued requests superseded by replay", stale);
        }

        match self.authenticate(&mut conn).await {
            Ok(session_id) => info!("Authenticated (session {})", session_id),
            Err(AuthFailure::Shutdown) => {
                close_quietly(&mut conn).await;
                return Attempt::Shutdown;
            }
            Err(AuthFailure::Rejected { code, reason }) => {
                close_quietly(&mut conn).await;
                return Attempt::AuthRejected { code, reason };
            }
            Err(AuthFailure::Failed(err)) => return Attempt::Failed(err),
        }

        // CONNECTED before the snapshot: a concurrent subscribe either lands
        // in the replay or is sent live afterwards
        if !self.transition(ConnectionState::Connected) {
            close_quietly(&mut conn).await;
            return Attempt::Shutdown;
        }
        self.shared.set_reconnect_attempt(0);

        let mut heartbeat = HeartbeatMonitor::new(
            self.config.heartbeat_interval(),
            self.config.heartbeat_timeout(),
        );
        let replay = self
            .shared
            .registry
            .replay_requests(self.config.max_instruments_per_message);
        for request in &replay {
            debug!(
                "Replaying {} keys under {:?}",
                request.instrument_keys().len(),
                request.data.mode
            );
            if let Err(end) = self.write_request(&mut conn, request, &heartbeat).await {
                return conclude(&mut conn, end).await;
            }
        }
        info!("Connected; replayed {} subscribe requests", replay.len());
        self.dispatcher.connect();

        let end = self.stream(&mut conn, &mut heartbeat).await;
        conclude(&mut conn, end).await
    }

    async fn authenticate(&mut self, conn: &mut Connection) -> Result<String, AuthFailure> {
        let deadline = Instant::now() + self.config.auth_timeout();
        let request = FeedRequest::auth(self.access_token.clone());
        let bytes = request
            .to_bytes()
            .map_err(|e| AuthFailure::Failed(e.into()))?;
        write_before(conn, Frame::Binary(bytes), deadline, &mut self.shutdown)
            .await
            .map_err(auth_stall)?;

        loop {
            let frame = tokio::select! {
                frame = conn.recv() => frame,
                _ = sleep_until(deadline) => {
                    return Err(AuthFailure::Failed(FeedError::Connection(TransportError::Timeout)));
                }
                _ = shutdown_requested(&mut self.shutdown) => return Err(AuthFailure::Shutdown),
            };

            match frame {
                None => {
                    return Err(AuthFailure::Failed(FeedError::Connection(
                        TransportError::ConnectionClosed,
                    )));
                }
                Some(Err(e)) => return Err(AuthFailure::Failed(FeedError::Connection(e))),
                Some(Ok(Frame::Binary(bytes))) => match decode(&bytes) {
                    Ok(FeedMessage::Control(ControlMessage::AuthAck { session_id })) => {
                        return Ok(session_id);
                    }
                    Ok(FeedMessage::Control(ControlMessage::AuthReject { code, reason })) => {
                        return Err(AuthFailure::Rejected { code, reason });
                    }
                    Ok(other) => debug!("Ignoring {} frame before auth ack", other.label()),
                    Err(e) => {
                        warn!("Dropping undecodable frame during auth: {}", e);
                        self.dispatcher.error(&FeedError::Decode(e));
                    }
                },
                Some(Ok(Frame::Ping(payload))) => {
                    write_before(conn, Frame::Pong(payload), deadline, &mut self.shutdown)
                        .await
                        .map_err(auth_stall)?;
                }
                Some(Ok(Frame::Close(close))) => {
                    let detail = close.map_or_else(
                        || "no close frame".to_string(),
                        |c| format!("{} {}", c.code, c.reason),
                    );
                    return Err(AuthFailure::Failed(FeedError::Connection(
                        TransportError::ConnectionFailed(format!(
                            "closed during handshake: {}",
                            detail
                        )),
                    )));
                }
                Some(Ok(_)) => {}
            }
        }
    }

    /// Receive loop; runs until the link is lost or shutdown is requested
    async fn stream(
        &mut self,
        conn: &mut Connection,
        heartbeat: &mut HeartbeatMonitor,
    ) -> StreamEnd {
        let period = heartbeat.interval();
        let mut ping = interval_at(Instant::now() + period, period);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let event = tokio::select! {
                frame = conn.recv() => Event::Frame(frame),
                command = self.commands.recv() => Event::Command(command),
                _ = ping.tick() => Event::Ping,
                _ = sleep_until(heartbeat.deadline()) => Event::Stale,
                _ = shutdown_requested(&mut self.shutdown) => Event::Shutdown,
            };

            let written = match event {
                Event::Frame(None) => {
                    return StreamEnd::Lost(DisconnectReason::transport_error(
                        "stream ended without close frame",
                    ));
                }
                Event::Frame(Some(Err(e))) => {
                    return StreamEnd::Lost(DisconnectReason::transport_error(e.to_string()));
                }
                Event::Frame(Some(Ok(frame))) => {
                    heartbeat.record();
                    match frame {
                        Frame::Binary(bytes) => {
                            self.handle_payload(&bytes);
                            Ok(())
                        }
                        Frame::Ping(payload) => {
                            self.write(conn, Frame::Pong(payload), heartbeat).await
                        }
                        Frame::Pong(_) => {
                            trace!("Pong received");
                            Ok(())
                        }
                        Frame::Text(text) => {
                            debug!("Ignoring {} byte text frame", text.len());
                            Ok(())
                        }
                        Frame::Close(close) => {
                            let (code, message) = match close {
                                Some(c) => (Some(c.code), c.reason),
                                None => (None, "peer closed".to_string()),
                            };
                            return StreamEnd::Lost(DisconnectReason::remote_closed(code, message));
                        }
                    }
                }
                Event::Command(Some(Command::Send(request))) => {
                    self.write_request(conn, &request, heartbeat).await
                }
                // Handle dropped its sender: treat as shutdown
                Event::Command(None) | Event::Shutdown => return StreamEnd::Shutdown,
                Event::Ping => {
                    let sent = self.write(conn, Frame::Ping(Vec::new()), heartbeat).await;
                    if sent.is_ok() {
                        heartbeat.record_ping();
                        debug!("Ping {} sent", heartbeat.pings_sent());
                    }
                    sent
                }
                Event::Stale => {
                    let silence = heartbeat.silence();
                    warn!(
                        "No liveness signal for {}ms (timeout {}ms)",
                        silence.as_millis(),
                        heartbeat.timeout().as_millis()
                    );
                    return StreamEnd::Lost(DisconnectReason::heartbeat_timeout(
                        silence.as_millis(),
                    ));
                }
            };

            if let Err(end) = written {
                return end;
            }
        }
    }

    /// Encode and write one request; a request that cannot be encoded is
    /// reported and skipped
    async fn write_request(
        &mut self,
        conn: &mut Connection,
        request: &FeedRequest,
        heartbeat: &HeartbeatMonitor,
    ) -> Result<(), StreamEnd> {
        let bytes = match request.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                let err = FeedError::from(e);
                warn!("Dropping {:?} request {}: {}", request.method, request.guid, err);
                self.dispatcher.error(&err);
                return Ok(());
            }
        };
        self.write(conn, Frame::Binary(bytes), heartbeat).await?;
        trace!("Sent {:?} request {}", request.method, request.guid);
        Ok(())
    }

    /// Write one frame without losing sight of the liveness deadline
    ///
    /// A write still pending at the deadline means the link is dead even if
    /// the socket has not noticed yet.
    async fn write(
        &mut self,
        conn: &mut Connection,
        frame: Frame,
        heartbeat: &HeartbeatMonitor,
    ) -> Result<(), StreamEnd> {
        match write_before(conn, frame, heartbeat.deadline(), &mut self.shutdown).await {
            Ok(()) => Ok(()),
            Err(WriteStall::Failed(e)) => Err(StreamEnd::Lost(DisconnectReason::transport_error(
                e.to_string(),
            ))),
            Err(WriteStall::Deadline) => {
                let silence = heartbeat.silence();
                warn!("Write still pending after {}ms of silence", silence.as_millis());
                Err(StreamEnd::Lost(DisconnectReason::heartbeat_timeout(
                    silence.as_millis(),
                )))
            }
            Err(WriteStall::Shutdown) => Err(StreamEnd::Shutdown),
        }
    }

    /// Decode one binary frame and dispatch it; decode failures drop the frame only
    fn handle_payload(&self, bytes: &[u8]) {
        match decode(bytes) {
            Ok(message) => {
                trace!("{} frame, {} ticks", message.label(), message.ticks().len());
                self.dispatcher.message(message);
            }
            Err(e) if e.is_unknown_message_type() => {
                warn!("Skipping frame: {}", e);
                self.dispatcher.error(&FeedError::Decode(e));
            }
            Err(e) => {
                warn!("Dropping corrupt frame ({} bytes): {}", bytes.len(), e);
                self.dispatcher.error(&FeedError::Decode(e));
            }
        }
    }
}

/// Race a write against `deadline` and shutdown
async fn write_before(
    conn: &mut Connection,
    frame: Frame,
    deadline: Instant,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), WriteStall> {
    tokio::select! {
        result = conn.send(frame) => result.map_err(WriteStall::Failed),
        _ = sleep_until(deadline) => Err(WriteStall::Deadline),
        _ = shutdown_requested(shutdown) => Err(WriteStall::Shutdown),
    }
}

fn auth_stall(stall: WriteStall) -> AuthFailure {
    match stall {
        WriteStall::Failed(e) => AuthFailure::Failed(FeedError::Connection(e)),
        WriteStall::Deadline => AuthFailure::Failed(FeedError::Connection(TransportError::Timeout)),
        WriteStall::Shutdown => AuthFailure::Shutdown,
    }
}

/// Map the end of a streaming connection to the attempt outcome
async fn conclude(conn: &mut Connection, end: StreamEnd) -> Attempt {
    match end {
        StreamEnd::Lost(reason) => Attempt::Lost(reason),
        StreamEnd::Shutdown => {
            close_normally(conn).await;
            Attempt::Shutdown
        }
    }
}

async fn close_normally(conn: &mut Connection) {
    match timeout(CLOSE_TIMEOUT, conn.close(Some(CloseFrame::normal()))).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!("Close failed: {}", e),
        Err(_) => debug!("Close still pending after {}ms", CLOSE_TIMEOUT.as_millis()),
    }
}

async fn close_quietly(conn: &mut Connection) {
    let _ = timeout(CLOSE_TIMEOUT, conn.close(None)).await;
}
