use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Subscription tier controlling which fields the feed streams for an instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionMode {
    /// Last traded price, quantity, time and close price
    Ltpc,
    /// LTPC plus first depth level and option Greeks
    OptionGreeks,
    /// LTPC, 5-level depth, Greeks, OHLC and session statistics
    Full,
    /// Same as `Full` with 30 depth levels
    #[serde(rename = "full_d30")]
    FullD30,
}

impl SubscriptionMode {
    /// All modes, in replay order
    pub const ALL: [SubscriptionMode; 4] = [
        SubscriptionMode::Ltpc,
        SubscriptionMode::OptionGreeks,
        SubscriptionMode::Full,
        SubscriptionMode::FullD30,
    ];

    /// Maximum number of instruments that may be subscribed under this mode
    pub fn max_instruments(&self) -> usize {
        match self {
            SubscriptionMode::Ltpc => 5000,
            SubscriptionMode::OptionGreeks => 3000,
            SubscriptionMode::Full => 2000,
            SubscriptionMode::FullD30 => 2000,
        }
    }

    /// Number of depth levels streamed under this mode (0 = none)
    pub fn depth_levels(&self) -> usize {
        match self {
            SubscriptionMode::Ltpc => 0,
            SubscriptionMode::OptionGreeks => 1,
            SubscriptionMode::Full => 5,
            SubscriptionMode::FullD30 => 30,
        }
    }

    /// Wire name of the mode
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionMode::Ltpc => "ltpc",
            SubscriptionMode::OptionGreeks => "option_greeks",
            SubscriptionMode::Full => "full",
            SubscriptionMode::FullD30 => "full_d30",
        }
    }
}

impl std::fmt::Display for SubscriptionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown mode name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownModeError(pub String);

impl std::fmt::Display for UnknownModeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown subscription mode: {}", self.0)
    }
}

impl std::error::Error for UnknownModeError {}

impl FromStr for SubscriptionMode {
    type Err = UnknownModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ltpc" => Ok(SubscriptionMode::Ltpc),
            "option_greeks" => Ok(SubscriptionMode::OptionGreeks),
            "full" => Ok(SubscriptionMode::Full),
            "full_d30" => Ok(SubscriptionMode::FullD30),
            _ => Err(UnknownModeError(s.to_string())),
        }
    }
}
