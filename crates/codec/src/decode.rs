//! Binary tick decoder
//!
//! Stateless: `decode` maps one raw frame to one [`FeedMessage`]. Prices from
//! both schema versions end up as `Decimal` at [`tickstream_core::PRICE_SCALE`], so the same
//! instrument decodes identically whichever version the feed used.

use bincode::Options;
use chrono::DateTime;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use tickstream_core::{
    DepthLevel, InstrumentKey, MarketDepth, MarketStatus, Ohlc, OptionGreeks, Price, SegmentStatus,
    SessionStats, Tick, Timestamp, normalize_price,
};

use crate::error::{DecodeError, DecodeResult};
use crate::message::{FeedMessage, TickBatch};
use crate::wire::{
    ControlMessage, FeedBatchV1, FeedBatchV2, HEADER_LEN, MessageKind, SCHEMA_V1, SCHEMA_V2,
    WireFeedEntry, WireGreeks, WireMarketInfo, WireOhlc, WireQuote, WireStats, mode_from_code,
};

/// Decode one inbound frame
pub fn decode(frame: &[u8]) -> DecodeResult<FeedMessage> {
    if frame.len() < HEADER_LEN {
        return Err(DecodeError::Truncated(format!(
            "{} byte(s), header needs {}",
            frame.len(),
            HEADER_LEN
        )));
    }

    let kind = MessageKind::from_byte(frame[0]).ok_or(DecodeError::UnknownMessageType(frame[0]))?;
    let version = frame[1];
    if !kind.supports_version(version) {
        return Err(DecodeError::UnsupportedVersion { kind, version });
    }

    let payload = &frame[HEADER_LEN..];
    match kind {
        MessageKind::LiveFeed => decode_batch(version, payload).map(FeedMessage::LiveFeed),
        MessageKind::InitialFeed => decode_batch(version, payload).map(FeedMessage::InitialFeed),
        MessageKind::MarketInfo => decode_market_info(payload).map(FeedMessage::MarketInfo),
        MessageKind::Control => read_payload::<ControlMessage>(payload).map(FeedMessage::Control),
    }
}

/// Fixed-width integers like `bincode::serialize`, but the payload must be
/// consumed exactly
fn read_payload<T: DeserializeOwned>(payload: &[u8]) -> DecodeResult<T> {
    let options = bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .reject_trailing_bytes();
    Ok(options.deserialize(payload)?)
}

fn decode_batch(version: u8, payload: &[u8]) -> DecodeResult<TickBatch> {
    match version {
        SCHEMA_V1 => {
            let batch: FeedBatchV1 = read_payload(payload)?;
            build_batch(batch.current_ts, batch.feeds, 0)
        }
        SCHEMA_V2 => {
            let batch: FeedBatchV2 = read_payload(payload)?;
            if batch.price_scale > 28 {
                return Err(DecodeError::InvalidField {
                    field: "price_scale",
                    value: batch.price_scale.to_string(),
                });
            }
            build_batch(batch.current_ts, batch.feeds, batch.price_scale)
        }
        other => Err(DecodeError::UnsupportedVersion {
            kind: MessageKind::LiveFeed,
            version: other,
        }),
    }
}

fn build_batch<P: WirePrice>(
    current_ts: i64,
    feeds: Vec<WireFeedEntry<P>>,
    scale: u32,
) -> DecodeResult<TickBatch> {
    let timestamp = timestamp_from_millis(current_ts)?;
    let ticks = feeds
        .into_iter()
        .map(|entry| build_tick(entry, scale, timestamp))
        .collect::<DecodeResult<Vec<_>>>()?;

    Ok(TickBatch { timestamp, ticks })
}

fn build_tick<P: WirePrice>(
    entry: WireFeedEntry<P>,
    scale: u32,
    timestamp: Timestamp,
) -> DecodeResult<Tick> {
    let mode = mode_from_code(entry.mode).ok_or_else(|| DecodeError::InvalidField {
        field: "mode",
        value: entry.mode.to_string(),
    })?;

    let last_traded_time = match entry.ltpc.ltt {
        0 => None,
        ms => Some(timestamp_from_millis(ms)?),
    };

    let market_depth = if entry.depth.is_empty() {
        None
    } else {
        let levels = entry
            .depth
            .into_iter()
            .map(|quote| depth_level(quote, scale))
            .collect::<DecodeResult<Vec<_>>>()?;
        Some(MarketDepth::new(levels))
    };

    let ohlc = entry
        .ohlc
        .into_iter()
        .map(|bar| ohlc_bar(bar, scale))
        .collect::<DecodeResult<Vec<_>>>()?;

    let stats = entry
        .stats
        .map(|stats| session_stats(stats, scale))
        .transpose()?;

    Ok(Tick {
        instrument_key: InstrumentKey::new(entry.instrument_key),
        mode,
        last_traded_price: entry.ltpc.ltp.to_price(scale, "ltp")?,
        last_traded_quantity: entry.ltpc.ltq,
        close_price: entry.ltpc.cp.to_price(scale, "cp")?,
        last_traded_time,
        market_depth,
        option_greeks: entry.greeks.map(option_greeks),
        ohlc,
        stats,
        timestamp,
    })
}

fn depth_level<P: WirePrice>(quote: WireQuote<P>, scale: u32) -> DecodeResult<DepthLevel> {
    Ok(DepthLevel {
        bid_price: quote.bid_p.to_price(scale, "bid_p")?,
        bid_quantity: quote.bid_q,
        ask_price: quote.ask_p.to_price(scale, "ask_p")?,
        ask_quantity: quote.ask_q,
    })
}

fn ohlc_bar<P: WirePrice>(bar: WireOhlc<P>, scale: u32) -> DecodeResult<Ohlc> {
    Ok(Ohlc {
        interval: bar.interval,
        open: bar.open.to_price(scale, "open")?,
        high: bar.high.to_price(scale, "high")?,
        low: bar.low.to_price(scale, "low")?,
        close: bar.close.to_price(scale, "close")?,
        volume: bar.vol,
        timestamp: timestamp_from_millis(bar.ts)?,
    })
}

fn session_stats<P: WirePrice>(stats: WireStats<P>, scale: u32) -> DecodeResult<SessionStats> {
    Ok(SessionStats {
        average_price: stats.atp.to_price(scale, "atp")?,
        volume: stats.vtt,
        open_interest: stats.oi,
        implied_volatility: stats.iv,
        total_buy_quantity: stats.tbq,
        total_sell_quantity: stats.tsq,
    })
}

fn option_greeks(greeks: WireGreeks) -> OptionGreeks {
    OptionGreeks {
        delta: greeks.delta,
        theta: greeks.theta,
        gamma: greeks.gamma,
        vega: greeks.vega,
        rho: greeks.rho,
    }
}

fn decode_market_info(payload: &[u8]) -> DecodeResult<MarketStatus> {
    let info: WireMarketInfo = read_payload(payload)?;
    let segments: BTreeMap<String, SegmentStatus> = info
        .segments
        .into_iter()
        .map(|(segment, code)| (segment, SegmentStatus::from_code(code)))
        .collect();

    Ok(MarketStatus::new(segments, timestamp_from_millis(info.current_ts)?))
}

fn timestamp_from_millis(ms: i64) -> DecodeResult<Timestamp> {
    DateTime::from_timestamp_millis(ms).ok_or(DecodeError::InvalidTimestamp(ms))
}

/// Price representation on the wire
///
/// Both conversions end at the canonical price scale via `normalize_price`.
trait WirePrice {
    fn to_price(self, scale: u32, field: &'static str) -> DecodeResult<Price>;
}

impl WirePrice for f64 {
    fn to_price(self, _scale: u32, field: &'static str) -> DecodeResult<Price> {
        let value = Decimal::from_f64(self).ok_or_else(|| DecodeError::InvalidField {
            field,
            value: self.to_string(),
        })?;
        Ok(normalize_price(value))
    }
}

impl WirePrice for i64 {
    fn to_price(self, scale: u32, field: &'static str) -> DecodeResult<Price> {
        let value = Decimal::try_new(self, scale).map_err(|_| DecodeError::InvalidField {
            field,
            value: format!("{}e-{}", self, scale),
        })?;
        Ok(normalize_price(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::{WireLtpc, mode_code};
    use rust_decimal_macros::dec;
    use tickstream_core::{PRICE_SCALE, SubscriptionMode};

    fn frame(kind: MessageKind, version: u8, payload: &impl serde::Serialize) -> Vec<u8> {
        let mut bytes = vec![kind as u8, version];
        bytes.extend(bincode::serialize(payload).unwrap());
        bytes
    }

    fn ltpc_entry(key: &str, ltp: f64, cp: f64) -> WireFeedEntry<f64> {
        WireFeedEntry {
            instrument_key: key.to_string(),
            mode: mode_code(SubscriptionMode::Ltpc),
            ltpc: WireLtpc {
                ltp,
                ltt: 1_700_000_000_000,
                ltq: 25,
                cp,
            },
            depth: Vec::new(),
            greeks: None,
            ohlc: Vec::new(),
            stats: None,
        }
    }

    #[test]
    fn test_decode_ltpc_batch_preserves_order() {
        let batch = FeedBatchV1 {
            current_ts: 1_700_000_000_500,
            feeds: vec![
                ltpc_entry("NSE_EQ|A", 100.05, 99.5),
                ltpc_entry("NSE_EQ|B", 2500.0, 2490.25),
                ltpc_entry("NSE_EQ|C", 0.35, 0.4),
            ],
        };

        let message = decode(&frame(MessageKind::LiveFeed, SCHEMA_V1, &batch)).unwrap();
        let ticks = message.ticks();

        assert_eq!(ticks.len(), 3);
        assert_eq!(ticks[0].instrument_key.as_str(), "NSE_EQ|A");
        assert_eq!(ticks[1].instrument_key.as_str(), "NSE_EQ|B");
        assert_eq!(ticks[2].instrument_key.as_str(), "NSE_EQ|C");
        assert_eq!(ticks[0].last_traded_price, dec!(100.05));
        assert_eq!(ticks[1].close_price, dec!(2490.25));
        assert_eq!(ticks[0].last_traded_quantity, 25);
        assert!(ticks[0].last_traded_time.is_some());
    }

    #[test]
    fn test_versions_decode_to_same_representation() {
        let v1 = FeedBatchV1 {
            current_ts: 1_700_000_000_000,
            feeds: vec![ltpc_entry("NSE_EQ|A", 812.35, 800.0)],
        };
        let v2 = FeedBatchV2 {
            current_ts: 1_700_000_000_000,
            price_scale: 2,
            feeds: vec![WireFeedEntry {
                instrument_key: "NSE_EQ|A".to_string(),
                mode: mode_code(SubscriptionMode::Ltpc),
                ltpc: WireLtpc {
                    ltp: 81235,
                    ltt: 1_700_000_000_000,
                    ltq: 25,
                    cp: 80000,
                },
                depth: Vec::new(),
                greeks: None,
                ohlc: Vec::new(),
                stats: None,
            }],
        };

        let a = decode(&frame(MessageKind::LiveFeed, SCHEMA_V1, &v1)).unwrap();
        let b = decode(&frame(MessageKind::LiveFeed, SCHEMA_V2, &v2)).unwrap();

        let (a, b) = (&a.ticks()[0], &b.ticks()[0]);
        assert_eq!(a.last_traded_price, b.last_traded_price);
        assert_eq!(a.last_traded_price.scale(), PRICE_SCALE);
        assert_eq!(b.last_traded_price.scale(), PRICE_SCALE);
        assert_eq!(a.last_traded_price.to_string(), b.last_traded_price.to_string());
    }

    #[test]
    fn test_unknown_message_type() {
        let err = decode(&[0x7f, 1, 0, 0]).unwrap_err();
        assert_eq!(err, DecodeError::UnknownMessageType(0x7f));
        assert!(err.is_unknown_message_type());
    }

    #[test]
    fn test_unsupported_version_is_skippable() {
        let err = decode(&[MessageKind::Control as u8, 9, 0]).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedVersion { version: 9, .. }));
        assert!(err.is_unknown_message_type());
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(decode(&[]), Err(DecodeError::Truncated(_))));
        assert!(matches!(decode(&[1]), Err(DecodeError::Truncated(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let batch = FeedBatchV1 {
            current_ts: 1_700_000_000_000,
            feeds: vec![ltpc_entry("NSE_EQ|A", 1.0, 1.0)],
        };
        let bytes = frame(MessageKind::LiveFeed, SCHEMA_V1, &batch);

        let err = decode(&bytes[..bytes.len() - 5]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated(_)));
        assert!(!err.is_unknown_message_type());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let batch = FeedBatchV1 {
            current_ts: 1_700_000_000_000,
            feeds: vec![ltpc_entry("NSE_EQ|A", 1.0, 1.0)],
        };
        let mut bytes = frame(MessageKind::LiveFeed, SCHEMA_V1, &batch);
        assert!(decode(&bytes).is_ok());

        bytes.extend_from_slice(&[0xde, 0xad]);
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
        assert!(!err.is_unknown_message_type());
    }

    #[test]
    fn test_non_finite_price_rejected() {
        let batch = FeedBatchV1 {
            current_ts: 1_700_000_000_000,
            feeds: vec![ltpc_entry("NSE_EQ|A", f64::NAN, 1.0)],
        };
        let err = decode(&frame(MessageKind::LiveFeed, SCHEMA_V1, &batch)).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "ltp", .. }));
    }

    #[test]
    fn test_invalid_mode_code() {
        let mut entry = ltpc_entry("NSE_EQ|A", 1.0, 1.0);
        entry.mode = 42;
        let batch = FeedBatchV1 {
            current_ts: 1_700_000_000_000,
            feeds: vec![entry],
        };
        let err = decode(&frame(MessageKind::LiveFeed, SCHEMA_V1, &batch)).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidField { field: "mode", .. }));
    }

    #[test]
    fn test_decode_market_info() {
        let info = WireMarketInfo {
            current_ts: 1_700_000_000_000,
            segments: vec![("NSE_EQ".to_string(), 2), ("MCX_FO".to_string(), 17)],
        };
        let message = decode(&frame(MessageKind::MarketInfo, SCHEMA_V1, &info)).unwrap();

        let FeedMessage::MarketInfo(status) = message else {
            panic!("expected market info");
        };
        assert_eq!(status.status_of("NSE_EQ"), Some(SegmentStatus::NormalOpen));
        assert_eq!(status.status_of("MCX_FO"), Some(SegmentStatus::Unknown(17)));
    }

    #[test]
    fn test_decode_control() {
        let ack = ControlMessage::AuthAck {
            session_id: "s-1".to_string(),
        };
        let message = decode(&frame(MessageKind::Control, SCHEMA_V1, &ack)).unwrap();
        assert_eq!(message, FeedMessage::Control(ack));
    }
}
