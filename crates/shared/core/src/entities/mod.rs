mod connection;
mod market_status;
mod mode;
mod tick;

pub use connection::{ConnectionState, DisconnectKind, DisconnectReason};
pub use market_status::{MarketStatus, SegmentStatus};
pub use mode::{SubscriptionMode, UnknownModeError};
pub use tick::{DepthLevel, MarketDepth, Ohlc, OptionGreeks, SessionStats, Tick};
