//! Inbound wire schema
//!
//! Every inbound frame is a two-byte envelope header followed by a bincode
//! payload:
//!
//! ```text
//! ┌──────────┬────────────────┬──────────────────────────────┐
//! │ kind: u8 │ version: u8    │ bincode payload              │
//! └──────────┴────────────────┴──────────────────────────────┘
//! ```
//!
//! Feed batches exist in two schema versions that differ only in how prices
//! travel: version 1 carries `f64`, version 2 carries `i64` mantissas with a
//! batch-wide decimal scale. Decimals never go on the wire directly since
//! bincode can't deserialize `rust_decimal` (it needs `deserialize_any`).

use serde::{Deserialize, Serialize};
use tickstream_core::SubscriptionMode;

/// Length of the envelope header
pub const HEADER_LEN: usize = 2;

/// Schema version with `f64` prices
pub const SCHEMA_V1: u8 = 1;

/// Schema version with fixed-point `i64` prices
pub const SCHEMA_V2: u8 = 2;

/// Envelope type discriminator (first byte of every frame)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Incremental ticks
    LiveFeed = 1,
    /// Snapshot ticks sent right after a subscription
    InitialFeed = 2,
    /// Market-segment status
    MarketInfo = 3,
    /// Session control (auth acknowledgement, server heartbeat)
    Control = 4,
}

impl MessageKind {
    /// Map a discriminator byte to a kind
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            1 => Some(MessageKind::LiveFeed),
            2 => Some(MessageKind::InitialFeed),
            3 => Some(MessageKind::MarketInfo),
            4 => Some(MessageKind::Control),
            _ => None,
        }
    }

    /// Schema versions this client can decode for the kind
    pub fn supports_version(&self, version: u8) -> bool {
        match self {
            MessageKind::LiveFeed | MessageKind::InitialFeed => {
                version == SCHEMA_V1 || version == SCHEMA_V2
            }
            MessageKind::MarketInfo | MessageKind::Control => version == SCHEMA_V1,
        }
    }
}

/// Wire code for a subscription mode
pub fn mode_code(mode: SubscriptionMode) -> u8 {
    match mode {
        SubscriptionMode::Ltpc => 0,
        SubscriptionMode::OptionGreeks => 1,
        SubscriptionMode::Full => 2,
        SubscriptionMode::FullD30 => 3,
    }
}

/// Subscription mode for a wire code
pub fn mode_from_code(code: u8) -> Option<SubscriptionMode> {
    match code {
        0 => Some(SubscriptionMode::Ltpc),
        1 => Some(SubscriptionMode::OptionGreeks),
        2 => Some(SubscriptionMode::Full),
        3 => Some(SubscriptionMode::FullD30),
        _ => None,
    }
}

/// Last traded price, time (epoch ms), quantity and close price
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireLtpc<P> {
    pub ltp: P,
    pub ltt: i64,
    pub ltq: u64,
    pub cp: P,
}

/// One depth rank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireQuote<P> {
    pub bid_q: u64,
    pub bid_p: P,
    pub ask_q: u64,
    pub ask_p: P,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireGreeks {
    pub delta: f64,
    pub theta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub rho: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireOhlc<P> {
    pub interval: String,
    pub open: P,
    pub high: P,
    pub low: P,
    pub close: P,
    pub vol: u64,
    pub ts: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireStats<P> {
    pub atp: P,
    pub vtt: u64,
    pub oi: f64,
    pub iv: f64,
    pub tbq: f64,
    pub tsq: f64,
}

/// One instrument's update inside a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireFeedEntry<P> {
    pub instrument_key: String,
    pub mode: u8,
    pub ltpc: WireLtpc<P>,
    pub depth: Vec<WireQuote<P>>,
    pub greeks: Option<WireGreeks>,
    pub ohlc: Vec<WireOhlc<P>>,
    pub stats: Option<WireStats<P>>,
}

/// Schema v1 tick batch (`f64` prices)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedBatchV1 {
    pub current_ts: i64,
    pub feeds: Vec<WireFeedEntry<f64>>,
}

/// Schema v2 tick batch (prices are `mantissa / 10^price_scale`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedBatchV2 {
    pub current_ts: i64,
    pub price_scale: u32,
    pub feeds: Vec<WireFeedEntry<i64>>,
}

/// Market-segment status payload (segment name, status code)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMarketInfo {
    pub current_ts: i64,
    pub segments: Vec<(String, u8)>,
}

/// Session control payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMessage {
    /// Handshake accepted
    AuthAck { session_id: String },
    /// Handshake rejected (bad or expired credential)
    AuthReject { code: u16, reason: String },
    /// Server keep-alive (epoch ms)
    Heartbeat { ts: i64 },
}
