use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Price value - uses Decimal for precision
///
/// Every price that enters the system is rescaled to [`PRICE_SCALE`] so two
/// ticks of the same instrument compare and print identically regardless of
/// the wire encoding they arrived in.
pub type Price = Decimal;

/// Traded or quoted quantity (exchange lots are whole units)
pub type Quantity = u64;

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Number of decimal places carried by every [`Price`]
pub const PRICE_SCALE: u32 = 4;

/// Bring a decimal to the canonical price scale
pub fn normalize_price(mut value: Decimal) -> Price {
    value.rescale(PRICE_SCALE);
    value
}
