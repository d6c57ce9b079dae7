// =============================================================================
// Poloniex worker — candlestick polling over the public chart-data endpoint
// =============================================================================
//
// Candlestick-only: no order-book ingestion for this venue. Each
// (pair, period) seeds from a 15-day `returnChartData` window, then polls a
// narrow window around now every request interval. Pairs and periods are
// translated to the canonical vocabulary before storage; a pair that does not
// translate is skipped.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, error, info, warn};

use crate::config::{parse_go_duration, PollerConfig};
use crate::exchanges::{sleep_or_stop, Adapter, SubscriptionSet};
use crate::models::intervals::{poloniex_interval_to_canonical, POLONIEX_PERIODS};
use crate::models::symbols::{poloniex_symbol_to_canonical, POLONIEX_SYMBOLS};
use crate::models::Candle;
use crate::storage::Storage;

const BASE_URL: &str = "https://poloniex.com/public";

/// History window fetched at (re)initialisation.
const INIT_WINDOW: Duration = Duration::from_secs(15 * 24 * 3600);

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

/// One chart-data bucket. `date` is the bucket open in Unix seconds; an
/// empty range comes back as a single all-zero bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct PoloniexTick {
    pub date: i64,
    pub high: f64,
    pub low: f64,
    pub open: f64,
    pub close: f64,
    pub volume: f64,
    #[serde(rename = "quoteVolume", default)]
    pub quote_volume: f64,
    #[serde(rename = "weightedAverage", default)]
    pub weighted_average: f64,
}

/// `btc-ltc` -> `BTC_LTC`, the spelling the chart-data endpoint expects.
fn to_request_pair(symbol: &str) -> String {
    symbol.to_uppercase().replace('-', "_")
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

pub struct PoloniexWorker {
    storage: Storage,
    client: reqwest::Client,
    subs: Arc<SubscriptionSet>,
    request_interval: Duration,
}

impl PoloniexWorker {
    pub fn new(cfg: &PollerConfig, storage: Storage) -> Result<Self> {
        let request_interval = parse_go_duration(&cfg.request_interval)
            .context("could not parse Poloniex request_interval")?;

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

    fn spawn_candle_task(&self, symbol: &'static str, period: u32) {
        let (mut stop, done) = self
            .subs
            .register(format!("poloniex:chart:{symbol}:{period}"));
        let storage = self.storage.clone();
        let client = self.client.clone();
        let request_interval = self.request_interval;

        tokio::spawn(async move {
            init_chart_data(&client, &storage, symbol, period).await;

            // Steady state: a window of a few request intervals around now
            // catches the open bucket plus any bucket that just closed.
            let slack = (request_interval.as_secs() as i64 * 3).max(1);
            loop {
                if sleep_or_stop(request_interval, &mut stop).await {
                    break;
                }

                let now = Utc::now().timestamp();
                match chart_data(&client, symbol, period, now - slack, now + slack).await {
                    Ok(ticks) => store_ticks(&storage, symbol, period, &ticks).await,
                    Err(e) => warn!(symbol, period, error = %e, "could not poll chart data"),
                }
            }

            let _ = done.send(());
        });
    }
}

impl Adapter for PoloniexWorker {
    fn name(&self) -> &'static str {
        "poloniex"
    }

    fn start(&self) {
        for symbol in POLONIEX_SYMBOLS {
            for period in POLONIEX_PERIODS {
                self.spawn_candle_task(symbol, period);
            }
        }
        info!(
            symbols = POLONIEX_SYMBOLS.len(),
            periods = POLONIEX_PERIODS.len(),
            "Poloniex worker started"
        );
    }

    fn reload(&self) {
        for symbol in POLONIEX_SYMBOLS {
            for period in POLONIEX_PERIODS {
                let storage = self.storage.clone();
                let client = self.client.clone();
                tokio::spawn(async move {
                    init_chart_data(&client, &storage, symbol, period).await;
                });
            }
        }
        info!("Poloniex candle cache reloaded");
    }
}

// ---------------------------------------------------------------------------
// REST calls
// ---------------------------------------------------------------------------

async fn init_chart_data(
    client: &reqwest::Client,
    storage: &Storage,
    symbol: &'static str,
    period: u32,
) {
    let now = Utc::now().timestamp();
    let start = now - INIT_WINDOW.as_secs() as i64;

    match chart_data(client, symbol, period, start, now).await {
        Ok(ticks) => store_ticks(storage, symbol, period, &ticks).await,
        Err(e) => error!(symbol, period, error = %e, "could not load chart history"),
    }
}

/// GET public?command=returnChartData. The endpoint reports failures as a
/// 200 with an `error` field.
async fn chart_data(
    client: &reqwest::Client,
    symbol: &str,
    period: u32,
    start: i64,
    end: i64,
) -> Result<Vec<PoloniexTick>> {
    let pair = to_request_pair(symbol);
    let url = format!(
        "{BASE_URL}?command=returnChartData&currencyPair={pair}&start={start}&end={end}&period={period}"
    );

    let resp = client
        .get(&url)
        .send()
        .await
        .context("returnChartData request failed")?;

    let status = resp.status();
    let body: serde_json::Value = resp
        .json()
        .await
        .context("failed to parse chart data response")?;

    if !status.is_success() {
        anyhow::bail!("returnChartData returned {status} for {pair}");
    }
    if let Some(err) = body.get("error").and_then(|v| v.as_str()) {
        anyhow::bail!("returnChartData error for {pair}: {err}");
    }

    let ticks: Vec<PoloniexTick> =
        serde_json::from_value(body).context("failed to decode chart data buckets")?;

    debug!(pair, period, count = ticks.len(), "chart data fetched");
    Ok(ticks)
}

/// Translate and upsert a batch of buckets. The all-zero placeholder bucket
/// an empty range produces is skipped.
async fn store_ticks(storage: &Storage, symbol: &str, period: u32, ticks: &[PoloniexTick]) {
    let canonical_symbol = poloniex_symbol_to_canonical(symbol);
    let canonical_interval = poloniex_interval_to_canonical(period);
    if canonical_symbol.is_empty() || canonical_interval.is_empty() {
        debug!(symbol, period, "no canonical translation, skipping");
        return;
    }

    for tick in ticks {
        if tick.date == 0 {
            continue;
        }

        let candle = Candle::from_poloniex(tick);
        if let Err(e) = storage
            .store_candle("poloniex", canonical_symbol, canonical_interval, &candle)
            .await
        {
            error!(symbol, period, error = %e, "could not store chart bucket");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
