//! Tickstream Core Domain
//!
//! Pure domain types for the tickstream market-data client.
//! This crate contains no async, no I/O, and is 100% unit testable.

pub mod entities;
pub mod instruments;
pub mod values;

// Re-export commonly used types at crate root
pub use entities::{
    // Session lifecycle
    ConnectionState,
    // Market data
    DepthLevel,
    DisconnectKind,
    DisconnectReason,
    MarketDepth,
    MarketStatus,
    Ohlc,
    OptionGreeks,
    SegmentStatus,
    SessionStats,
    // Subscriptions
    SubscriptionMode,
    Tick,
    UnknownModeError,
};
pub use instruments::InstrumentKey;
pub use values::{PRICE_SCALE, Price, Quantity, Timestamp, normalize_price};
