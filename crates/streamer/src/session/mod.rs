//! Connection Session
//!
//! [`MarketDataStreamer`] is the caller-facing handle. The socket, the
//! heartbeat timer and the reconnect policy live in a background task
//! (`runner`); the handle talks to it through three shared pieces:
//!
//! ```text
//!  caller                               session task
//!  ──────                               ────────────
//!  subscribe() ──► SubscriptionRegistry ◄── replay on every CONNECTED
//!       │
//!       └──(if CONNECTED)──► command queue ──► single write path
//!  disconnect() ──► shutdown flag ──► ends read / backoff wait
//!  state() ◄──────── watch<ConnectionState> ◄── every transition
//! ```
//!
//! Each `connect()` starts a new run with a fresh generation number; state
//! changes from an older run are ignored, so a late transition from a task
//! that is shutting down can never overwrite `CLOSED`.

mod runner;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use log::{debug, error, info};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use tickstream_codec::FeedRequest;
use tickstream_core::{ConnectionState, InstrumentKey, SubscriptionMode};
use tickstream_ports::{FeedConnector, TransportError};

use crate::config::StreamerConfig;
use crate::dispatch::{Dispatcher, FeedHandler};
use crate::error::{FeedError, FeedResult};
use crate::registry::{SubscriptionRegistry, chunk_keys};

use runner::{Command, SessionRunner};

/// State shared between the handle and the session task
pub(crate) struct Shared {
    pub(crate) registry: SubscriptionRegistry,
    state: watch::Sender<ConnectionState>,
    generation: AtomicU64,
    reconnect_attempt: AtomicU32,
}

impl Shared {
    fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            registry: SubscriptionRegistry::new(),
            state,
            generation: AtomicU64::new(0),
            reconnect_attempt: AtomicU32::new(0),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Move run `generation` to `to` if the state table allows it. Returns
    /// false once the run is stale; a refused move leaves the state as it was.
    pub(crate) fn transition(&self, generation: u64, to: ConnectionState) -> bool {
        let mut current = true;
        self.state.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                current = false;
                return false;
            }
            if *state == to {
                return false;
            }
            if !state.can_transition_to(to) {
                error!("Refusing session state change {} -> {}", state, to);
                return false;
            }
            info!("Session state {} -> {}", state, to);
            *state = to;
            true
        });
        current
    }

    /// Start a new run in CONNECTING, if the current state allows it
    fn begin_run(&self) -> FeedResult<u64> {
        let mut result = Ok(0);
        self.state.send_if_modified(|state| {
            if !state.can_connect() {
                result = Err(FeedError::AlreadyConnected { state: *state });
                return false;
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            info!("Session state {} -> {} (run {})", state, ConnectionState::Connecting, generation);
            *state = ConnectionState::Connecting;
            result = Ok(generation);
            true
        });
        result
    }

    /// Retire the current run and move to CLOSED
    fn close_run(&self) {
        self.state.send_if_modified(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            if *state == ConnectionState::Closed {
                return false;
            }
            info!("Session state {} -> {}", state, ConnectionState::Closed);
            *state = ConnectionState::Closed;
            true
        });
    }

    pub(crate) fn set_reconnect_attempt(&self, attempt: u32) {
        self.reconnect_attempt.store(attempt, Ordering::SeqCst);
    }
}

/// Handles of the current run
#[derive(Default)]
struct RunSlot {
    commands: Option<mpsc::UnboundedSender<Command>>,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    /// Built on first `connect()` outside any tokio runtime
    runtime: Option<Runtime>,
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamerStatus {
    pub state: ConnectionState,
    pub is_connected: bool,
    pub subscriptions: BTreeMap<SubscriptionMode, Vec<InstrumentKey>>,
    /// Reconnect attempts since the last successful connection
    pub reconnect_attempt: u32,
}

impl StreamerStatus {
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.values().map(Vec::len).sum()
    }
}

/// Streaming market-data session
///
/// Subscriptions are kept in a registry that survives reconnects and is
/// replayed on every successful authentication, so callers may subscribe
/// before `connect()` or while the link is down.
///
/// Dropping the handle disconnects the session.
pub struct MarketDataStreamer {
    config: StreamerConfig,
    access_token: String,
    connector: Arc<dyn FeedConnector>,
    dispatcher: Dispatcher,
    shared: Arc<Shared>,
    run: Mutex<RunSlot>,
}

impl MarketDataStreamer {
    /// Create a session; nothing connects until [`connect`](Self::connect)
    pub fn new(
        config: StreamerConfig,
        access_token: impl Into<String>,
        connector: Arc<dyn FeedConnector>,
        handler: Arc<dyn FeedHandler>,
    ) -> FeedResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            access_token: access_token.into(),
            connector,
            dispatcher: Dispatcher::new(handler),
            shared: Arc::new(Shared::new()),
            run: Mutex::new(RunSlot::default()),
        })
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    /// Start the session in the background
    ///
    /// Returns immediately. Fails with `AlreadyConnected` unless the session
    /// is DISCONNECTED or CLOSED.
    pub fn connect(&self) -> FeedResult<()> {
        let mut run = self.run.lock();
        let generation = self.shared.begin_run()?;

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                let runtime = match run.runtime.take() {
                    Some(runtime) => runtime,
                    None => match build_runtime() {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            self.shared.close_run();
                            return Err(FeedError::Connection(e));
                        }
                    },
                };
                let handle = runtime.handle().clone();
                run.runtime = Some(runtime);
                handle
            }
        };

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        self.shared.set_reconnect_attempt(0);

        let runner = SessionRunner {
            generation,
            config: self.config.clone(),
            access_token: self.access_token.clone(),
            connector: Arc::clone(&self.connector),
            dispatcher: self.dispatcher.clone(),
            shared: Arc::clone(&self.shared),
            commands: command_rx,
            shutdown: shutdown_rx,
        };

        run.commands = Some(command_tx);
        run.shutdown = Some(shutdown_tx);
        run.task = Some(handle.spawn(runner.run()));
        Ok(())
    }

    /// Stop the session: CLOSED immediately, socket released and any
    /// backoff wait cancelled. Safe to call repeatedly and from any thread.
    pub fn disconnect(&self) {
        let mut run = self.run.lock();
        self.shared.close_run();
        run.commands = None;
        if let Some(shutdown) = run.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }

    /// Disconnect and wait for the session task to finish
    pub async fn shutdown(&self) {
        self.disconnect();
        let task = self.run.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                error!("Session task ended abnormally: {}", e);
            }
        }
    }

    /// Subscribe `keys` under `mode`
    ///
    /// The registry is updated whatever the connection state; the request is
    /// sent now only when CONNECTED, otherwise on the next replay.
    pub fn subscribe(&self, keys: &[InstrumentKey], mode: SubscriptionMode) -> FeedResult<()> {
        let applied = self.shared.registry.subscribe(keys, mode)?;
        self.send_live(applied, |chunk| FeedRequest::subscribe(mode, chunk));
        Ok(())
    }

    pub fn unsubscribe(&self, keys: &[InstrumentKey]) -> FeedResult<()> {
        let removed = self.shared.registry.unsubscribe(keys);
        self.send_live(removed, FeedRequest::unsubscribe);
        Ok(())
    }

    /// Move subscribed `keys` to `mode` (unsubscribed keys are skipped)
    pub fn change_mode(&self, keys: &[InstrumentKey], mode: SubscriptionMode) -> FeedResult<()> {
        let moved = self.shared.registry.change_mode(keys, mode)?;
        self.send_live(moved, |chunk| FeedRequest::change_mode(mode, chunk));
        Ok(())
    }

    fn send_live(
        &self,
        keys: Vec<InstrumentKey>,
        request: impl Fn(Vec<InstrumentKey>) -> FeedRequest,
    ) {
        if keys.is_empty() {
            return;
        }
        let state = self.shared.state();
        if state != ConnectionState::Connected {
            debug!("{} keys deferred until next replay (state {})", keys.len(), state);
            return;
        }

        let run = self.run.lock();
        let Some(commands) = &run.commands else {
            return;
        };
        for chunk in chunk_keys(keys, self.config.max_instruments_per_message) {
            if commands.send(Command::Send(request(chunk))).is_err() {
                debug!("Session task gone; request left to the next replay");
                break;
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state() == ConnectionState::Connected
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Receiver that observes every state transition
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    pub fn subscriptions(&self) -> BTreeMap<SubscriptionMode, Vec<InstrumentKey>> {
        self.shared.registry.snapshot()
    }

    pub fn status(&self) -> StreamerStatus {
        let state = self.shared.state();
        StreamerStatus {
            state,
            is_connected: state == ConnectionState::Connected,
            subscriptions: self.shared.registry.snapshot(),
            reconnect_attempt: self.shared.reconnect_attempt.load(Ordering::SeqCst),
        }
    }
}

impl fmt::Debug for MarketDataStreamer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MarketDataStreamer")
            .field("endpoint", &self.connector.endpoint())
            .field("state", &self.shared.state())
            .field("subscriptions", &self.shared.registry.len())
            .finish_non_exhaustive()
    }
}

impl Drop for MarketDataStreamer {
    fn drop(&mut self) {
        self.disconnect();
        if let Some(runtime) = self.run.get_mut().runtime.take() {
            runtime.shutdown_background();
        }
    }
}

fn build_runtime() -> Result<Runtime, TransportError> {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("tickstream-session")
        .enable_all()
        .build()
        .map_err(TransportError::from)
}
