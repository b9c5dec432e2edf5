//! Dispatch Layer
//!
//! Routes decoded ticks and lifecycle events to the application. Handlers run
//! synchronously inside the session loop and must return quickly; a slow
//! handler stalls the stream (and eventually the heartbeat).

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use log::error;
use tickstream_codec::FeedMessage;
use tickstream_core::{DisconnectReason, MarketStatus, Tick};

use crate::error::FeedError;

/// Event sink for one session
///
/// Every method has a no-op default, so implementors only override what they
/// need.
pub trait FeedHandler: Send + Sync {
    /// One decoded tick (ownership passes to the handler)
    fn on_tick(&self, _tick: Tick) {}

    /// Authenticated and streaming
    fn on_connect(&self) {}

    /// An established or in-progress connection ended
    fn on_disconnect(&self, _reason: &DisconnectReason) {}

    /// About to wait `delay` before reconnect attempt `attempt`
    fn on_reconnecting(&self, _attempt: u32, _delay: Duration) {}

    fn on_error(&self, _error: &FeedError) {}

    fn on_market_status(&self, _status: &MarketStatus) {}

    /// Every decoded frame, before its ticks are dispatched
    fn on_message(&self, _message: &FeedMessage) {}
}

/// Handler that drops every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl FeedHandler for NoopHandler {}

/// Closure-based handler with one optional slot per event category
///
/// ```ignore
/// let callbacks = Callbacks::new()
///     .on_tick(|tick| println!("{} {}", tick.instrument_key, tick.last_traded_price))
///     .on_disconnect(|reason| eprintln!("lost feed: {}", reason));
/// ```
#[derive(Default)]
pub struct Callbacks {
    tick: Option<Box<dyn Fn(Tick) + Send + Sync>>,
    connect: Option<Box<dyn Fn() + Send + Sync>>,
    disconnect: Option<Box<dyn Fn(&DisconnectReason) + Send + Sync>>,
    reconnecting: Option<Box<dyn Fn(u32, Duration) + Send + Sync>>,
    error: Option<Box<dyn Fn(&FeedError) + Send + Sync>>,
    market_status: Option<Box<dyn Fn(&MarketStatus) + Send + Sync>>,
    message: Option<Box<dyn Fn(&FeedMessage) + Send + Sync>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_tick(mut self, f: impl Fn(Tick) + Send + Sync + 'static) -> Self {
        self.tick = Some(Box::new(f));
        self
    }

    pub fn on_connect(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.connect = Some(Box::new(f));
        self
    }

    pub fn on_disconnect(mut self, f: impl Fn(&DisconnectReason) + Send + Sync + 'static) -> Self {
        self.disconnect = Some(Box::new(f));
        self
    }

    pub fn on_reconnecting(mut self, f: impl Fn(u32, Duration) + Send + Sync + 'static) -> Self {
        self.reconnecting = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&FeedError) + Send + Sync + 'static) -> Self {
        self.error = Some(Box::new(f));
        self
    }

    pub fn on_market_status(mut self, f: impl Fn(&MarketStatus) + Send + Sync + 'static) -> Self {
        self.market_status = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&FeedMessage) + Send + Sync + 'static) -> Self {
        self.message = Some(Box::new(f));
        self
    }
}

impl FeedHandler for Callbacks {
    fn on_tick(&self, tick: Tick) {
        if let Some(f) = &self.tick {
            f(tick)
        }
    }

    fn on_connect(&self) {
        if let Some(f) = &self.connect {
            f()
        }
    }

    fn on_disconnect(&self, reason: &DisconnectReason) {
        if let Some(f) = &self.disconnect {
            f(reason)
        }
    }

    fn on_reconnecting(&self, attempt: u32, delay: Duration) {
        if let Some(f) = &self.reconnecting {
            f(attempt, delay)
        }
    }

    fn on_error(&self, error: &FeedError) {
        if let Some(f) = &self.error {
            f(error)
        }
    }

    fn on_market_status(&self, status: &MarketStatus) {
        if let Some(f) = &self.market_status {
            f(status)
        }
    }

    fn on_message(&self, message: &FeedMessage) {
        if let Some(f) = &self.message {
            f(message)
        }
    }
}

/// Session-side wrapper around the handler
///
/// A panicking handler is logged and the event dropped; the session loop
/// keeps running.
#[derive(Clone)]
pub(crate) struct Dispatcher {
    handler: Arc<dyn FeedHandler>,
}

impl Dispatcher {
    pub(crate) fn new(handler: Arc<dyn FeedHandler>) -> Self {
        Self { handler }
    }

    fn guarded(&self, event: &str, f: impl FnOnce(&dyn FeedHandler)) {
        let handler = self.handler.as_ref();
        if catch_unwind(AssertUnwindSafe(|| f(handler))).is_err() {
            error!("Handler panicked in {}; event dropped", event);
        }
    }

    /// Hand a decoded frame to the handler: whole message first, then its
    /// ticks in wire order, then market status
    pub(crate) fn message(&self, message: FeedMessage) {
        self.guarded("on_message", |h| h.on_message(&message));
        match message {
            FeedMessage::LiveFeed(batch) | FeedMessage::InitialFeed(batch) => {
                for tick in batch.ticks {
                    self.guarded("on_tick", |h| h.on_tick(tick));
                }
            }
            FeedMessage::MarketInfo(status) => {
                self.guarded("on_market_status", |h| h.on_market_status(&status));
            }
            FeedMessage::Control(_) => {}
        }
    }

    pub(crate) fn connect(&self) {
        self.guarded("on_connect", |h| h.on_connect());
    }

    pub(crate) fn disconnect(&self, reason: &DisconnectReason) {
        self.guarded("on_disconnect", |h| h.on_disconnect(reason));
    }

    pub(crate) fn reconnecting(&self, attempt: u32, delay: Duration) {
        self.guarded("on_reconnecting", |h| h.on_reconnecting(attempt, delay));
    }

    pub(crate) fn error(&self, error: &FeedError) {
        self.guarded("on_error", |h| h.on_error(error));
    }
}
