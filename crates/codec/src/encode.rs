//! Frame encoder
//!
//! The inverse of [`crate::decode`], used by feed simulators and tests to
//! produce frames exactly as the feed would.

use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tickstream_core::{MarketStatus, PRICE_SCALE, Price, Tick, Timestamp, normalize_price};

use crate::error::EncodeError;
use crate::wire::{
    ControlMessage, FeedBatchV1, FeedBatchV2, MessageKind, SCHEMA_V1, SCHEMA_V2, WireFeedEntry,
    WireGreeks, WireLtpc, WireMarketInfo, WireOhlc, WireQuote, WireStats, mode_code,
};

/// Prepend the envelope header to a bincode payload
pub fn encode_frame<T: Serialize>(
    kind: MessageKind,
    version: u8,
    payload: &T,
) -> Result<Vec<u8>, EncodeError> {
    let body = bincode::serialize(payload)?;
    let mut frame = Vec::with_capacity(body.len() + 2);
    frame.push(kind as u8);
    frame.push(version);
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Encode ticks as one batched feed frame
///
/// `kind` must be `LiveFeed` or `InitialFeed`; `version` picks between `f64`
/// (v1) and fixed-point (v2) prices.
pub fn encode_ticks(
    kind: MessageKind,
    version: u8,
    timestamp: Timestamp,
    ticks: &[Tick],
) -> Result<Vec<u8>, EncodeError> {
    let current_ts = timestamp.timestamp_millis();
    match version {
        SCHEMA_V1 => {
            let feeds = ticks
                .iter()
                .map(|tick| wire_entry(tick, &F64Prices))
                .collect::<Result<Vec<_>, _>>()?;
            encode_frame(kind, SCHEMA_V1, &FeedBatchV1 { current_ts, feeds })
        }
        SCHEMA_V2 => {
            let feeds = ticks
                .iter()
                .map(|tick| wire_entry(tick, &FixedPrices))
                .collect::<Result<Vec<_>, _>>()?;
            let batch = FeedBatchV2 {
                current_ts,
                price_scale: PRICE_SCALE,
                feeds,
            };
            encode_frame(kind, SCHEMA_V2, &batch)
        }
        other => Err(EncodeError::Serialization(format!(
            "unknown schema version {}",
            other
        ))),
    }
}

/// Encode a market-status frame
pub fn encode_market_status(status: &MarketStatus) -> Result<Vec<u8>, EncodeError> {
    let info = WireMarketInfo {
        current_ts: status.timestamp.timestamp_millis(),
        segments: status
            .segments
            .iter()
            .map(|(segment, status)| (segment.clone(), status.code()))
            .collect(),
    };
    encode_frame(MessageKind::MarketInfo, SCHEMA_V1, &info)
}

/// Encode a control frame
pub fn encode_control(message: &ControlMessage) -> Result<Vec<u8>, EncodeError> {
    encode_frame(MessageKind::Control, SCHEMA_V1, message)
}

trait PriceEncoding {
    type Wire;
    fn encode(&self, price: Price) -> Result<Self::Wire, EncodeError>;
}

struct F64Prices;

impl PriceEncoding for F64Prices {
    type Wire = f64;

    fn encode(&self, price: Price) -> Result<f64, EncodeError> {
        price
            .to_f64()
            .ok_or_else(|| EncodeError::InvalidPrice(price.to_string()))
    }
}

struct FixedPrices;

impl PriceEncoding for FixedPrices {
    type Wire = i64;

    fn encode(&self, price: Price) -> Result<i64, EncodeError> {
        i64::try_from(normalize_price(price).mantissa())
            .map_err(|_| EncodeError::InvalidPrice(price.to_string()))
    }
}

fn wire_entry<E: PriceEncoding>(
    tick: &Tick,
    prices: &E,
) -> Result<WireFeedEntry<E::Wire>, EncodeError> {
    let depth = match &tick.market_depth {
        Some(depth) => depth
            .levels
            .iter()
            .map(|level| {
                Ok(WireQuote {
                    bid_q: level.bid_quantity,
                    bid_p: prices.encode(level.bid_price)?,
                    ask_q: level.ask_quantity,
                    ask_p: prices.encode(level.ask_price)?,
                })
            })
            .collect::<Result<Vec<_>, EncodeError>>()?,
        None => Vec::new(),
    };

    let ohlc = tick
        .ohlc
        .iter()
        .map(|bar| {
            Ok(WireOhlc {
                interval: bar.interval.clone(),
                open: prices.encode(bar.open)?,
                high: prices.encode(bar.high)?,
                low: prices.encode(bar.low)?,
                close: prices.encode(bar.close)?,
                vol: bar.volume,
                ts: bar.timestamp.timestamp_millis(),
            })
        })
        .collect::<Result<Vec<_>, EncodeError>>()?;

    let stats = match &tick.stats {
        Some(stats) => Some(WireStats {
            atp: prices.encode(stats.average_price)?,
            vtt: stats.volume,
            oi: stats.open_interest,
            iv: stats.implied_volatility,
            tbq: stats.total_buy_quantity,
            tsq: stats.total_sell_quantity,
        }),
        None => None,
    };

    Ok(WireFeedEntry {
        instrument_key: tick.instrument_key.as_str().to_string(),
        mode: mode_code(tick.mode),
        ltpc: WireLtpc {
            ltp: prices.encode(tick.last_traded_price)?,
            ltt: tick
                .last_traded_time
                .map(|t| t.timestamp_millis())
                .unwrap_or(0),
            ltq: tick.last_traded_quantity,
            cp: prices.encode(tick.close_price)?,
        },
        depth,
        greeks: tick.option_greeks.map(|g| WireGreeks {
            delta: g.delta,
            theta: g.theta,
            gamma: g.gamma,
            vega: g.vega,
            rho: g.rho,
        }),
        ohlc,
        stats,
    })
}
