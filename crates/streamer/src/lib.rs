//! Tickstream Streamer
//!
//! Long-lived market-data session: connects, authenticates, keeps the
//! caller's subscriptions alive across reconnects and hands decoded ticks to
//! a [`FeedHandler`].
//!
//! ```text
//!                 ┌──────────────────────────────────────────┐
//!  caller ──────► │ MarketDataStreamer                        │
//!  subscribe()    │   SubscriptionRegistry (per-mode ceilings)│
//!  connect()      └───────────────┬──────────────────────────┘
//!                                 │ spawn
//!                 ┌───────────────▼──────────────────────────┐
//!                 │ session task                              │
//!                 │   CONNECTING → AUTHENTICATING → CONNECTED │
//!                 │        ▲                          │       │
//!                 │        └──── RECONNECTING ◄───────┘       │
//!                 │   HeartbeatMonitor · ExponentialBackoff   │
//!                 └───────┬──────────────────────┬───────────┘
//!                         │ FeedConnection        │ decode()
//!                  websocket / in-memory      Dispatcher → FeedHandler
//! ```
//!
//! ```ignore
//! let connector = Arc::new(WebSocketConnector::new(&authorized_url)?);
//! let callbacks = Callbacks::new().on_tick(|tick| println!("{:?}", tick));
//! let streamer = MarketDataStreamer::new(StreamerConfig::default(), token, connector, Arc::new(callbacks))?;
//! streamer.subscribe(&keys, SubscriptionMode::Ltpc)?;
//! streamer.connect()?;
//! ```

pub mod adapters;
pub mod backoff;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod heartbeat;
pub mod registry;
mod session;

pub use adapters::{ChannelConnector, ChannelListener, ChannelPeer, WebSocketConnector};
pub use backoff::ExponentialBackoff;
pub use config::StreamerConfig;
pub use dispatch::{Callbacks, FeedHandler, NoopHandler};
pub use error::{FeedError, FeedResult};
pub use heartbeat::HeartbeatMonitor;
pub use registry::SubscriptionRegistry;
pub use session::{MarketDataStreamer, StreamerStatus};
