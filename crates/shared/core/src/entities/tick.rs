use serde::{Deserialize, Serialize};

use super::SubscriptionMode;
use crate::instruments::InstrumentKey;
use crate::values::{Price, Quantity, Timestamp};

/// One side-by-side depth level (bid and ask at the same rank)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthLevel {
    pub bid_price: Price,
    pub bid_quantity: Quantity,
    pub ask_price: Price,
    pub ask_quantity: Quantity,
}

/// Market depth, best level first
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketDepth {
    pub levels: Vec<DepthLevel>,
}

impl MarketDepth {
    pub fn new(levels: Vec<DepthLevel>) -> Self {
        Self { levels }
    }

    /// Best bid price, if any
    pub fn best_bid(&self) -> Option<Price> {
        self.levels.first().map(|l| l.bid_price)
    }

    /// Best ask price, if any
    pub fn best_ask(&self) -> Option<Price> {
        self.levels.first().map(|l| l.ask_price)
    }

    pub fn depth(&self) -> usize {
        self.levels.len()
    }
}

/// Option sensitivities as published by the feed
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OptionGreeks {
    pub delta: f64,
    pub theta: f64,
    pub gamma: f64,
    pub vega: f64,
    pub rho: f64,
}

/// OHLC bar for an interval such as `1d` or `I1`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ohlc {
    pub interval: String,
    pub open: Price,
    pub high: Price,
    pub low: Price,
    pub close: Price,
    pub volume: Quantity,
    pub timestamp: Timestamp,
}

/// Session-level statistics streamed in full modes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    /// Average traded price
    pub average_price: Price,
    /// Volume traded today
    pub volume: Quantity,
    /// Open interest
    pub open_interest: f64,
    /// Implied volatility
    pub implied_volatility: f64,
    /// Total buy quantity
    pub total_buy_quantity: f64,
    /// Total sell quantity
    pub total_sell_quantity: f64,
}

/// One decoded market-data update for an instrument
///
/// Immutable once built. The dispatch layer hands ownership to the
/// callback and keeps nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub instrument_key: InstrumentKey,
    pub mode: SubscriptionMode,
    pub last_traded_price: Price,
    pub last_traded_quantity: Quantity,
    pub close_price: Price,
    pub last_traded_time: Option<Timestamp>,
    pub market_depth: Option<MarketDepth>,
    pub option_greeks: Option<OptionGreeks>,
    pub ohlc: Vec<Ohlc>,
    pub stats: Option<SessionStats>,
    /// Feed timestamp of the batch this tick arrived in
    pub timestamp: Timestamp,
}

impl Tick {
    /// Create an LTPC-only tick
    pub fn ltpc(
        instrument_key: impl Into<InstrumentKey>,
        last_traded_price: Price,
        last_traded_quantity: Quantity,
        close_price: Price,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            instrument_key: instrument_key.into(),
            mode: SubscriptionMode::Ltpc,
            last_traded_price,
            last_traded_quantity,
            close_price,
            last_traded_time: None,
            market_depth: None,
            option_greeks: None,
            ohlc: Vec::new(),
            stats: None,
            timestamp,
        }
    }

    /// Absolute change from the previous close
    pub fn change(&self) -> Price {
        self.last_traded_price - self.close_price
    }
}
