// =============================================================================
// Binance public REST client — depth snapshots and kline history
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::models::{Candle, DepthSnapshot, OrderBookInternal};

/// Snapshot depth requested when seeding a book.
pub const ORDER_BOOK_MAX_LIMIT: u32 = 1000;
/// Kline window fetched when (re)initialising a candle series.
pub const CANDLESTICK_LIMIT: u32 = 1000;

/// Backoff after the exchange answers 429 on a snapshot.
const TOO_MANY_REQUESTS_BACKOFF: Duration = Duration::from_secs(1);

/// One kline row from the REST endpoint, times in milliseconds.
#[derive(Debug, Clone, Copy)]
pub struct RestKline {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Client for the public (unsigned) market-data endpoints.
#[derive(Clone)]
pub struct BinanceRest {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceRest {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            base_url: "https://api.binance.com".to_string(),
            client,
        }
    }

    /// GET /api/v3/depth — order-book snapshot at up to 1000 levels.
    ///
    /// A 429 sleeps one second and retries; any other non-200 fails the
    /// current attempt (the caller's reconnect loop retries later).
    pub async fn depth_snapshot(&self, symbol: &str, limit: u32) -> Result<OrderBookInternal> {
        let url = format!(
            "{}/api/v3/depth?symbol={}&limit={}",
            self.base_url, symbol, limit
        );

        loop {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .context("GET /api/v3/depth request failed")?;

            let status = resp.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                warn!(symbol, "depth snapshot rate-limited, backing off");
                tokio::time::sleep(TOO_MANY_REQUESTS_BACKOFF).await;
                continue;
            }
            if !status.is_success() {
                anyhow::bail!("GET /api/v3/depth returned {status} for {symbol}");
            }

            let snapshot: DepthSnapshot = resp
                .json()
                .await
                .context("failed to parse depth snapshot")?;

            debug!(
                symbol,
                last_update_id = snapshot.last_update_id,
                bids = snapshot.bids.len(),
                asks = snapshot.asks.len(),
                "depth snapshot fetched"
            );
            return Ok(snapshot.into());
        }
    }

    /// GET /api/v3/klines — recent candle window, parsed from the exchange's
    /// array-of-arrays format.
    ///
    /// Array indices:
    ///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
    ///   [6] closeTime, ...
    pub async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Candle>> {
        let url = format!(
            "{}/api/v3/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );

        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("GET /api/v3/klines returned {status}: {body}");
        }

        let raw = body.as_array().context("klines response is not an array")?;

        let mut candles = Vec::with_capacity(raw.len());

        for entry in raw {
            let arr = entry.as_array().context("kline entry is not an array")?;
            if arr.len() < 7 {
                warn!(elements = arr.len(), "skipping malformed kline entry");
                continue;
            }

            let (open, high, low, close, volume) = match (
                parse_str_f64(&arr[1]),
                parse_str_f64(&arr[2]),
                parse_str_f64(&arr[3]),
                parse_str_f64(&arr[4]),
                parse_str_f64(&arr[5]),
            ) {
                (Some(o), Some(h), Some(l), Some(c), Some(v)) => (o, h, l, c, v),
                _ => {
                    warn!(symbol, interval, "skipping kline entry with unparseable price");
                    continue;
                }
            };

            let kline = RestKline {
                open_time: arr[0].as_i64().unwrap_or(0),
                close_time: arr[6].as_i64().unwrap_or(0),
                open,
                high,
                low,
                close,
                volume,
            };
            candles.push(Candle::from_binance_rest(&kline));
        }

        debug!(symbol, interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

impl Default for BinanceRest {
    fn default() -> Self {
        Self::new()
    }
}

/// The exchange sends numeric values as JSON strings; tolerate plain numbers
/// as well.
fn parse_str_f64(val: &serde_json::Value) -> Option<f64> {
    match val {
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        serde_json::Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_str_f64_handles_both_encodings() {
        assert_eq!(parse_str_f64(&serde_json::json!("37000.5")), Some(37000.5));
        assert_eq!(parse_str_f64(&serde_json::json!(42)), Some(42.0));
        assert_eq!(parse_str_f64(&serde_json::json!("x")), None);
        assert_eq!(parse_str_f64(&serde_json::json!(null)), None);
    }
}
