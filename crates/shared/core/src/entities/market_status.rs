use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::values::Timestamp;

/// Trading phase of an exchange segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentStatus {
    PreOpenStart,
    PreOpenEnd,
    NormalOpen,
    NormalClose,
    ClosingStart,
    ClosingEnd,
    /// Status code this client does not know yet
    Unknown(u8),
}

impl SegmentStatus {
    /// Map a feed status code to a status
    pub fn from_code(code: u8) -> Self {
        match code {
            0 => SegmentStatus::PreOpenStart,
            1 => SegmentStatus::PreOpenEnd,
            2 => SegmentStatus::NormalOpen,
            3 => SegmentStatus::NormalClose,
            4 => SegmentStatus::ClosingStart,
            5 => SegmentStatus::ClosingEnd,
            other => SegmentStatus::Unknown(other),
        }
    }

    /// Feed status code for this status
    pub fn code(&self) -> u8 {
        match self {
            SegmentStatus::PreOpenStart => 0,
            SegmentStatus::PreOpenEnd => 1,
            SegmentStatus::NormalOpen => 2,
            SegmentStatus::NormalClose => 3,
            SegmentStatus::ClosingStart => 4,
            SegmentStatus::ClosingEnd => 5,
            SegmentStatus::Unknown(code) => *code,
        }
    }

    /// Returns true while continuous trading is running
    pub fn is_open(&self) -> bool {
        matches!(self, SegmentStatus::NormalOpen)
    }
}

/// Market-segment status update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub segments: BTreeMap<String, SegmentStatus>,
    pub timestamp: Timestamp,
}

impl MarketStatus {
    pub fn new(segments: BTreeMap<String, SegmentStatus>, timestamp: Timestamp) -> Self {
        Self {
            segments,
            timestamp,
        }
    }

    /// Status of a single segment, e.g. `NSE_EQ`
    pub fn status_of(&self, segment: &str) -> Option<SegmentStatus> {
        self.segments.get(segment).copied()
    }
}
