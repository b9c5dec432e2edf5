//! Decoded inbound messages

use tickstream_core::{MarketStatus, Tick, Timestamp};

pub use crate::wire::ControlMessage;

/// Ticks decoded from one batched frame, in wire order
#[derive(Debug, Clone, PartialEq)]
pub struct TickBatch {
    /// Feed timestamp of the batch
    pub timestamp: Timestamp,
    pub ticks: Vec<Tick>,
}

impl TickBatch {
    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

/// A fully decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum FeedMessage {
    /// Incremental updates
    LiveFeed(TickBatch),
    /// Snapshot sent after subscribing
    InitialFeed(TickBatch),
    /// Market-segment status change
    MarketInfo(MarketStatus),
    /// Session control
    Control(ControlMessage),
}

impl FeedMessage {
    /// Ticks carried by the message, if it is a feed batch
    pub fn ticks(&self) -> &[Tick] {
        match self {
            FeedMessage::LiveFeed(batch) | FeedMessage::InitialFeed(batch) => &batch.ticks,
            _ => &[],
        }
    }

    /// Consume the message, returning its ticks (empty for non-feed messages)
    pub fn into_ticks(self) -> Vec<Tick> {
        match self {
            FeedMessage::LiveFeed(batch) | FeedMessage::InitialFeed(batch) => batch.ticks,
            _ => Vec::new(),
        }
    }

    /// Short label for logging
    pub fn label(&self) -> &'static str {
        match self {
            FeedMessage::LiveFeed(_) => "live_feed",
            FeedMessage::InitialFeed(_) => "initial_feed",
            FeedMessage::MarketInfo(_) => "market_info",
            FeedMessage::Control(_) => "control",
        }
    }
}
