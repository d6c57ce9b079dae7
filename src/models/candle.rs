// =============================================================================
// Candlestick data model and the cross-exchange merge
// =============================================================================

use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::exchanges::binance::rest::RestKline;
use crate::exchanges::binance::ws::KlineEvent;
use crate::exchanges::bittrex::BittrexTick;
use crate::exchanges::poloniex::PoloniexTick;
use crate::models::orderbook::parse_f64;

/// One OHLCV bucket. Times are seconds since epoch; `time_start` is the
/// bucket open and the candle's identity within a series, `time` is when the
/// observation was made (event time for streamed candles, fetch time for
/// REST-derived ones).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(rename = "timeStart")]
    pub time_start: i64,
    #[serde(rename = "timeEnd")]
    pub time_end: i64,
    pub time: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl Candle {
    /// From a streamed kline event: bucket times come from the kline
    /// (milliseconds to seconds), `time` is the event time. An unparseable
    /// price drops the sample.
    pub fn from_binance_ws(event: &KlineEvent) -> Option<Self> {
        Some(Self {
            time_start: event.kline.start_time / 1000,
            time_end: event.kline.end_time / 1000,
            time: event.event_time / 1000,
            open: parse_f64(&event.kline.open)?,
            close: parse_f64(&event.kline.close)?,
            high: parse_f64(&event.kline.high)?,
            low: parse_f64(&event.kline.low)?,
            volume: parse_f64(&event.kline.volume)?,
        })
    }

    /// From one REST kline row: bucket times come from the row (milliseconds
    /// to seconds), `time` is the fetch time.
    pub fn from_binance_rest(kline: &RestKline) -> Self {
        Self {
            time_start: kline.open_time / 1000,
            time_end: kline.close_time / 1000,
            time: Utc::now().timestamp(),
            open: kline.open,
            close: kline.close,
            high: kline.high,
            low: kline.low,
            volume: kline.volume,
        }
    }

    /// From a Bittrex tick: the single timestamp becomes both bucket bounds,
    /// `time` is the observation time. A malformed timestamp drops the
    /// sample.
    pub fn from_bittrex(tick: &BittrexTick) -> Option<Self> {
        let ts = NaiveDateTime::parse_from_str(&tick.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
            .ok()?
            .and_utc()
            .timestamp();

        Some(Self {
            time_start: ts,
            time_end: ts,
            time: Utc::now().timestamp(),
            open: tick.open,
            close: tick.close,
            high: tick.high,
            low: tick.low,
            volume: tick.volume,
        })
    }

    /// From a Poloniex chart bucket: the bucket open stamps both bounds,
    /// `time` is the observation time.
    pub fn from_poloniex(tick: &PoloniexTick) -> Self {
        Self {
            time_start: tick.date,
            time_end: tick.date,
            time: Utc::now().timestamp(),
            open: tick.open,
            close: tick.close,
            high: tick.high,
            low: tick.low,
            volume: tick.volume,
        }
    }
}

/// Response body of the `/candles` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandlestickResponse {
    #[serde(rename = "timeStart")]
    pub time_start: i64,
    #[serde(rename = "timeEnd")]
    pub time_end: i64,
    pub candles: Vec<Candle>,
}

// ---------------------------------------------------------------------------
// Cross-exchange merge
// ---------------------------------------------------------------------------

/// Fuse per-exchange candle series into one, keyed by bucket open time.
///
/// `series` must be given in the fixed merge order (Binance, Bittrex,
/// Poloniex). The first observation of a bucket is taken as-is; every later
/// observation of the same `time_start` folds in as
///
///   high   <- max(old, new)
///   low    <- min(old, new)
///   volume <- old + new
///   open   <- (old * k + new) / (k + 1)     k = prior contributor count
///   close  <- likewise
///
/// A per-bucket counter tracks how many exchanges have contributed so the
/// averages stay weighted correctly.
pub fn merge_candles(series: Vec<Vec<Candle>>) -> Vec<Candle> {
    let mut merged: BTreeMap<i64, (Candle, u32)> = BTreeMap::new();

    for candles in series {
        for candle in candles {
            match merged.entry(candle.time_start) {
                Entry::Vacant(slot) => {
                    slot.insert((candle, 1));
                }
                Entry::Occupied(mut slot) => {
                    let (acc, count) = slot.get_mut();
                    let k = *count as f64;
                    acc.high = acc.high.max(candle.high);
                    acc.low = acc.low.min(candle.low);
                    acc.volume += candle.volume;
                    acc.open = (acc.open * k + candle.open) / (k + 1.0);
                    acc.close = (acc.close * k + candle.close) / (k + 1.0);
                    *count += 1;
                }
            }
        }
    }

    merged.into_values().map(|(candle, _)| candle).collect()
}

// =============================================================================
// Tests
// =============================================================================
