// =============================================================================
// Bittrex worker — candlestick polling over the public v2 market endpoints
// =============================================================================
//
// Candlestick-only: no order-book ingestion for this venue. Each
// (market, tick interval) pair seeds from `GetTicks`, then polls
// `GetLatestTick` every request interval. Market names and tick intervals are
// translated to the canonical vocabulary before storage; a pair that does not
// translate is skipped.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::{parse_go_duration, PollerConfig};
use crate::exchanges::{sleep_or_stop, Adapter, SubscriptionSet};
use crate::models::intervals::{bittrex_interval_to_canonical, BITTREX_INTERVALS};
use crate::models::symbols::{bittrex_symbol_to_canonical, BITTREX_SYMBOLS};
use crate::models::Candle;
use crate::storage::Storage;

const BASE_URL: &str = "https://international.bittrex.com/Api/v2.0/pub/market";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// Envelope every v2 public endpoint wraps its payload in.
#[derive(Debug, Deserialize)]
struct BittrexResponse {
    success: bool,
    #[serde(default)]
    message: String,
    result: Option<Vec<BittrexTick>>,
}

/// One OHLCV tick. `T` is a naive UTC timestamp like `2019-01-21T15:30:00`.
#[derive(Debug, Clone, Deserialize)]
pub struct BittrexTick {
    #[serde(rename = "O")]
    pub open: f64,
    #[serde(rename = "H")]
    pub high: f64,
    #[serde(rename = "L")]
    pub low: f64,
    #[serde(rename = "C")]
    pub close: f64,
    #[serde(rename = "V")]
    pub volume: f64,
    #[serde(rename = "T")]
    pub timestamp: String,
    #[serde(rename = "BV", default)]
    pub base_volume: f64,
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct BittrexWorker {
    storage: Storage,
    client: reqwest::Client,
    subs: Arc<SubscriptionSet>,
    request_interval: Duration,
}

impl BittrexWorker {
    pub fn new(cfg: &PollerConfig, storage: Storage) -> Result<Self> {
        let request_interval = parse_go_duration(&cfg.request_interval)
            .context("could not parse Bittrex request_interval")?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Ok(Self {
            storage,
            client,
            subs: Arc::new(SubscriptionSet::new()),
            request_interval,
        })
    }

    pub async fn stop_all(&self) {
        self.subs.stop_all().await;
    }

    fn spawn_candle_task(&self, symbol: &'static str, interval: &'static str) {
        let (mut stop, done) = self
            .subs
            .register(format!("bittrex:tick:{symbol}:{interval}"));
        let storage = self.storage.clone();
        let client = self.client.clone();
        let request_interval = self.request_interval;

        tokio::spawn(async move {
            match get_ticks(&client, symbol, interval).await {
                Ok(ticks) => store_ticks(&storage, symbol, interval, &ticks).await,
                Err(e) => error!(symbol, interval, error = %e, "could not load tick history"),
            }

            loop {
                if sleep_or_stop(request_interval, &mut stop).await {
                    break;
                }
                match get_latest_tick(&client, symbol, interval).await {
                    Ok(ticks) => store_ticks(&storage, symbol, interval, &ticks).await,
                    Err(e) => warn!(symbol, interval, error = %e, "could not poll latest tick"),
                }
            }

            let _ = done.send(());
        });
    }
}

impl Adapter for BittrexWorker {
    fn name(&self) -> &'static str {
        "bittrex"
    }

    fn start(&self) {
        for symbol in BITTREX_SYMBOLS {
            for interval in BITTREX_INTERVALS {
                self.spawn_candle_task(symbol, interval);
            }
        }
        info!(
            symbols = BITTREX_SYMBOLS.len(),
            intervals = BITTREX_INTERVALS.len(),
            "Bittrex worker started"
        );
    }

    fn reload(&self) {
        for symbol in BITTREX_SYMBOLS {
            for interval in BITTREX_INTERVALS {
                let storage = self.storage.clone();
                let client = self.client.clone();
                tokio::spawn(async move {
                    match get_ticks(&client, symbol, interval).await {
                        Ok(ticks) => store_ticks(&storage, symbol, interval, &ticks).await,
                        Err(e) => {
                            error!(symbol, interval, error = %e, "could not reload tick history")
                        }
                    }
                });
            }
        }
        info!("Bittrex candle cache reloaded");
    }
}

// ---------------------------------------------------------------------------
// REST calls
// ---------------------------------------------------------------------------

/// GET pub/market/GetTicks — the provider's default history window.
async fn get_ticks(
    client: &reqwest::Client,
    symbol: &str,
    interval: &str,
) -> Result<Vec<BittrexTick>> {
    fetch_ticks(client, "GetTicks", symbol, interval).await
}

/// GET pub/market/GetLatestTick — the still-open bucket.
async fn get_latest_tick(
    client: &reqwest::Client,
    symbol: &str,
    interval: &str,
) -> Result<Vec<BittrexTick>> {
    fetch_ticks(client, "GetLatestTick", symbol, interval).await
}

async fn fetch_ticks(
    client: &reqwest::Client,
    endpoint: &str,
    symbol: &str,
    interval: &str,
) -> Result<Vec<BittrexTick>> {
    let url = format!("{BASE_URL}/{endpoint}?marketName={symbol}&tickInterval={interval}");

    let resp = client
        .get(&url)
        .send()
        .await
        .with_context(|| format!("GET {endpoint} request failed"))?;

    let status = resp.status();
    if !status.is_success() {
        anyhow::bail!("{endpoint} returned {status} for {symbol}");
    }

    let body: BittrexResponse = resp
        .json()
        .await
        .with_context(|| format!("failed to parse {endpoint} response"))?;

    if !body.success {
        anyhow::bail!("{endpoint} unsuccessful for {symbol}: {}", body.message);
    }

    Ok(body.result.unwrap_or_default())
}

/// Translate and upsert a batch of ticks. Pairs outside the translation
/// tables and ticks with malformed timestamps are skipped.
async fn store_ticks(storage: &Storage, symbol: &str, interval: &str, ticks: &[BittrexTick]) {
    let canonical_symbol = bittrex_symbol_to_canonical(symbol);
    let canonical_interval = bittrex_interval_to_canonical(interval);
    if canonical_symbol.is_empty() || canonical_interval.is_empty() {
        debug!(symbol, interval, "no canonical translation, skipping");
        return;
    }

    for tick in ticks {
        let Some(candle) = Candle::from_bittrex(tick) else {
            warn!(symbol, interval, timestamp = %tick.timestamp, "dropping tick with bad timestamp");
            continue;
        };

        if let Err(e) = storage
            .store_candle("bittrex", canonical_symbol, canonical_interval, &candle)
            .await
        {
            error!(symbol, interval, error = %e, "could not store tick");
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
    fn response_envelope_parses() {
        let raw = r#"{
            "success": true,
            "message": "",
            "result": [
                {"O": 0.0032, "H": 0.0034, "L": 0.0031, "C": 0.0033,
                 "V": 120.5, "T": "2019-01-21T15:30:00", "BV": 0.39}
            ]
        }"#;

        let resp: BittrexResponse = serde_json::from_str(raw).unwrap();
        assert!(resp.success);
        let ticks = resp.result.unwrap();
        assert_eq!(ticks.len(), 1);
        assert_eq!(ticks[0].close, 0.0033);
    }

    #[test]
    fn failed_envelope_has_no_result() {
        let raw = r#"{"success": false, "message": "INVALID_MARKET", "result": null}"#;
        let resp: BittrexResponse = serde_json::from_str(raw).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.message, "INVALID_MARKET");
        assert!(resp.result.is_none());
    }

    #[test]
    fn tick_timestamp_becomes_both_bucket_bounds() {
        let tick = BittrexTick {
            open: 1.0,
            high: 3.0,
            low: 0.5,
            close: 2.0,
            volume: 10.0,
            timestamp: "2023-11-14T22:00:00".to_string(),
            base_volume: 0.0,
        };

        let candle = Candle::from_bittrex(&tick).unwrap();
        assert_eq!(candle.time_start, 1_699_999_200);
        assert_eq!(candle.time_end, candle.time_start);
        assert_eq!(candle.high, 3.0);
    }

    #[test]
    fn tick_with_fractional_seconds_parses() {
        let tick = BittrexTick {
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
            timestamp: "2023-11-14T22:00:00.5".to_string(),
            base_volume: 0.0,
        };
        assert!(Candle::from_bittrex(&tick).is_some());
    }

    #[test]
    fn tick_with_bad_timestamp_is_dropped() {
        let tick = BittrexTick {
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 0.0,
            timestamp: "yesterday".to_string(),
            base_volume: 0.0,
        };
        assert!(Candle::from_bittrex(&tick).is_none());
    }
}
