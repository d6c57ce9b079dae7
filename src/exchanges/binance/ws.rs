// =============================================================================
// Binance WebSocket streams — depth diffs, klines, partial depth
// =============================================================================
//
// Each runner drives a single stream session: connect, read text frames,
// decode, hand off. A session ends when the stream closes, the session
// timeout elapses, or the stop flag flips; the caller owns reconnection.
// Undecodable frames are logged and skipped, never fatal.
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{error, info, warn};

use crate::models::{parse_f64, AskBid, Candle, OrderBookApi};
use crate::storage::Storage;

pub const WS_BASE_URL: &str = "wss://stream.binance.com:9443/ws";

/// Why a stream session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// Stop flag flipped; the task should wind down.
    Stopped,
    /// The exchange closed the stream; reconnect after the request interval.
    Closed,
    /// Session lifetime elapsed; cycle the connection.
    TimedOut,
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Diff depth event (`<symbol>@depth`). Level sizes stay textual; the literal
/// zero size marks a deletion.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "U", default)]
    pub first_update_id: i64,
    #[serde(rename = "u")]
    pub last_update_id: i64,
    #[serde(rename = "b")]
    pub bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    pub asks: Vec<[String; 2]>,
}

/// Kline event (`<symbol>@kline_<interval>`).
#[derive(Debug, Clone, Deserialize)]
pub struct KlineEvent {
    #[serde(rename = "E")]
    pub event_time: i64,
    #[serde(rename = "s")]
    pub symbol: String,
    #[serde(rename = "k")]
    pub kline: WsKline,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WsKline {
    #[serde(rename = "t")]
    pub start_time: i64,
    #[serde(rename = "T")]
    pub end_time: i64,
    #[serde(rename = "i")]
    pub interval: String,
    #[serde(rename = "o")]
    pub open: String,
    #[serde(rename = "c")]
    pub close: String,
    #[serde(rename = "h")]
    pub high: String,
    #[serde(rename = "l")]
    pub low: String,
    #[serde(rename = "v")]
    pub volume: String,
    #[serde(rename = "x", default)]
    pub is_closed: bool,
}

/// Partial depth frame (`<symbol>@depth20@100ms`): the top 20 levels, already
/// sorted by the exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct PartialDepthEvent {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: i64,
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

impl PartialDepthEvent {
    /// Convert to the compact API form, dropping unparseable levels.
    pub fn to_api(&self) -> OrderBookApi {
        let parse_levels = |levels: &[[String; 2]]| {
            levels
                .iter()
                .filter_map(|[price, size]| {
                    Some(AskBid {
                        price: parse_f64(price)?,
                        size: parse_f64(size)?,
                    })
                })
                .collect::<Vec<_>>()
        };

        OrderBookApi {
            asks: parse_levels(&self.asks),
            bids: parse_levels(&self.bids),
        }
    }
}

// ---------------------------------------------------------------------------
// Stream runners
// ---------------------------------------------------------------------------

/// Run one diff-depth session, forwarding decoded events into `tx`.
///
/// The channel is bounded by the caller; when the reconciler falls behind,
/// the send awaits rather than dropping events.
pub async fn run_depth_stream(
    symbol: &str,
    tx: &mpsc::Sender<DepthEvent>,
    stop: &mut watch::Receiver<bool>,
    ws_timeout: Duration,
) -> Result<StreamEnd> {
    let lower = symbol.to_lowercase();
    let url = format!("{WS_BASE_URL}/{lower}@depth");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to depth WebSocket")?;
    info!(symbol, "depth WebSocket connected");

    let (_write, mut read) = ws_stream.split();
    let deadline = tokio::time::sleep(ws_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!(symbol, "depth WebSocket session timeout, cycling");
                return Ok(StreamEnd::TimedOut);
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Ok(StreamEnd::Stopped);
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<DepthEvent>(&text) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                // Reconciler went away; nothing left to feed.
                                return Ok(StreamEnd::Stopped);
                            }
                        }
                        Err(e) => warn!(symbol, error = %e, "failed to parse depth event"),
                    }
                }
                // Ping/pong/binary frames; tungstenite answers pings itself.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(symbol, error = %e, "depth WebSocket read error");
                    return Err(e.into());
                }
                None => {
                    warn!(symbol, "depth WebSocket stream ended");
                    return Ok(StreamEnd::Closed);
                }
            }
        }
    }
}

/// Run one kline session, upserting every incoming candle (the still-open
/// bucket included, so the latest bucket is rewritten on each tick).
pub async fn run_kline_stream(
    symbol: &str,
    interval: &str,
    storage: &Storage,
    stop: &mut watch::Receiver<bool>,
    ws_timeout: Duration,
) -> Result<StreamEnd> {
    let lower = symbol.to_lowercase();
    let url = format!("{WS_BASE_URL}/{lower}@kline_{interval}");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to kline WebSocket")?;
    info!(symbol, interval, "kline WebSocket connected");

    let (_write, mut read) = ws_stream.split();
    let deadline = tokio::time::sleep(ws_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!(symbol, interval, "kline WebSocket session timeout, cycling");
                return Ok(StreamEnd::TimedOut);
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Ok(StreamEnd::Stopped);
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    let event = match serde_json::from_str::<KlineEvent>(&text) {
                        Ok(event) => event,
                        Err(e) => {
                            warn!(symbol, interval, error = %e, "failed to parse kline event");
                            continue;
                        }
                    };

                    let Some(candle) = Candle::from_binance_ws(&event) else {
                        warn!(symbol, interval, "dropping kline with unparseable price");
                        continue;
                    };

                    if let Err(e) = storage.store_candle("binance", symbol, interval, &candle).await {
                        error!(symbol, interval, error = %e, "could not store candle");
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(symbol, interval, error = %e, "kline WebSocket read error");
                    return Err(e.into());
                }
                None => {
                    warn!(symbol, interval, "kline WebSocket stream ended");
                    return Ok(StreamEnd::Closed);
                }
            }
        }
    }
}

/// Run one partial-depth session, appending each frame to the
/// `depth:<symbol>` history.
pub async fn run_partial_depth_stream(
    symbol: &str,
    storage: &Storage,
    stop: &mut watch::Receiver<bool>,
    ws_timeout: Duration,
) -> Result<StreamEnd> {
    let lower = symbol.to_lowercase();
    let url = format!("{WS_BASE_URL}/{lower}@depth20@100ms");

    let (ws_stream, _response) = connect_async(&url)
        .await
        .context("failed to connect to partial depth WebSocket")?;
    info!(symbol, "partial depth WebSocket connected");

    let (_write, mut read) = ws_stream.split();
    let deadline = tokio::time::sleep(ws_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!(symbol, "partial depth WebSocket session timeout, cycling");
                return Ok(StreamEnd::TimedOut);
            }
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    return Ok(StreamEnd::Stopped);
                }
            }
            msg = read.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    match serde_json::from_str::<PartialDepthEvent>(&text) {
                        Ok(event) => {
                            let book = event.to_api();
                            if let Err(e) = storage.store_depth_snapshot(symbol, &book).await {
                                error!(symbol, error = %e, "could not store depth snapshot");
                            }
                        }
                        Err(e) => warn!(symbol, error = %e, "failed to parse partial depth frame"),
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!(symbol, error = %e, "partial depth WebSocket read error");
                    return Err(e.into());
                }
                None => {
                    warn!(symbol, "partial depth WebSocket stream ended");
                    return Ok(StreamEnd::Closed);
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_event_parses() {
        let raw = r#"{
            "e": "depthUpdate",
            "E": 1700000000123,
            "s": "LTCBTC",
            "U": 157,
            "u": 160,
            "b": [["0.0024", "10.00000000"], ["0.0022", "0.00000000"]],
            "a": [["0.0026", "100.00000000"]]
        }"#;

        let event: DepthEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.symbol, "LTCBTC");
        assert_eq!(event.event_time, 1_700_000_000_123);
        assert_eq!(event.first_update_id, 157);
        assert_eq!(event.last_update_id, 160);
        assert_eq!(event.bids.len(), 2);
        // Sizes stay textual so the deletion sentinel survives verbatim.
        assert_eq!(event.bids[1][1], "0.00000000");
    }

    #[test]
    fn kline_event_normalizes_times_to_seconds() {
        let raw = r#"{
            "e": "kline",
            "E": 1700000005123,
            "s": "ETHBTC",
            "k": {
                "t": 1700000000000,
                "T": 1700003599999,
                "s": "ETHBTC",
                "i": "1h",
                "o": "0.055",
                "c": "0.056",
                "h": "0.057",
                "l": "0.054",
                "v": "1234.5",
                "x": false
            }
        }"#;

        let event: KlineEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.symbol, "ETHBTC");
        assert_eq!(event.kline.interval, "1h");
        assert!(!event.kline.is_closed);

        let candle = Candle::from_binance_ws(&event).unwrap();
        assert_eq!(candle.time_start, 1_700_000_000);
        assert_eq!(candle.time_end, 1_700_003_599);
        assert_eq!(candle.time, 1_700_000_005);
        assert_eq!(candle.open, 0.055);
        assert_eq!(candle.volume, 1234.5);
    }

    #[test]
    fn kline_event_with_bad_price_is_dropped() {
        let raw = r#"{
            "E": 1700000005123,
            "s": "ETHBTC",
            "k": {
                "t": 1700000000000,
                "T": 1700003599999,
                "i": "1h",
                "o": "not-a-price",
                "c": "0.056",
                "h": "0.057",
                "l": "0.054",
                "v": "1234.5"
            }
        }"#;

        let event: KlineEvent = serde_json::from_str(raw).unwrap();
        assert!(Candle::from_binance_ws(&event).is_none());
    }

    #[test]
    fn partial_depth_converts_and_drops_bad_levels() {
        let raw = r#"{
            "lastUpdateId": 999,
            "bids": [["0.0024", "10"], ["bogus", "1"]],
            "asks": [["0.0026", "100"]]
        }"#;

        let event: PartialDepthEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.last_update_id, 999);
        let book = event.to_api();

        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids[0].price, 0.0024);
        assert_eq!(book.asks[0].size, 100.0);
    }
}
