// =============================================================================
// Binance worker — order-book reconciliation plus candlestick fan-out
// =============================================================================
//
// One reconciler task and one partial-depth task per symbol, plus one
// candlestick task per (symbol, interval). Candle tasks seed their series
// from REST history, then follow the kline stream; every loop reconnects
// after `request_interval` and cycles its WebSocket session at `ws_timeout`.
// =============================================================================

pub mod orderbook;
pub mod rest;
pub mod ws;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::config::{parse_go_duration, BinanceConfig};
use crate::exchanges::{sleep_or_stop, Adapter, SubscriptionSet};
use crate::models::intervals::CANONICAL_INTERVALS;
use crate::models::symbols::BINANCE_SYMBOLS;
use crate::models::OrderBookInternal;
use crate::storage::Storage;

use orderbook::{BookCache, BookReconciler};
use rest::{BinanceRest, CANDLESTICK_LIMIT};
use ws::StreamEnd;

pub struct BinanceWorker {
    storage: Storage,
    rest: BinanceRest,
    reconciler: Arc<BookReconciler>,
    subs: Arc<SubscriptionSet>,
    symbols: Vec<String>,
    request_interval: Duration,
    ws_timeout: Duration,
}

impl BinanceWorker {
    /// Build the worker, validating the configured durations up front.
    pub fn new(cfg: &BinanceConfig, storage: Storage) -> Result<Self> {
        let ws_timeout =
            parse_go_duration(&cfg.ws_timeout).context("could not parse Binance ws_timeout")?;
        let request_interval = parse_go_duration(&cfg.request_interval)
            .context("could not parse Binance request_interval")?;

        let cache: BookCache = Arc::new(Mutex::new(HashMap::new()));
        let rest = BinanceRest::new();
        let reconciler = Arc::new(BookReconciler::new(
            cache,
            storage.clone(),
            rest.clone(),
            request_interval,
            ws_timeout,
        ));

        Ok(Self {
            storage,
            rest,
            reconciler,
            subs: Arc::new(SubscriptionSet::new()),
            symbols: BINANCE_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            request_interval,
            ws_timeout,
        })
    }

    /// Live reconciled book for a symbol, if present in the cache.
    pub fn order_book(&self, symbol: &str) -> Option<OrderBookInternal> {
        self.reconciler.get(symbol)
    }

    /// Signal every subscription and wait for the acknowledgments.
    pub async fn stop_all(&self) {
        self.subs.stop_all().await;
    }

    fn spawn_book_tasks(&self, symbol: &str) {
        // Diff reconciler.
        let (stop, done) = self.subs.register(format!("binance:book:{symbol}"));
        let reconciler = self.reconciler.clone();
        let sym = symbol.to_string();
        tokio::spawn(reconciler.run(sym, stop, done));

        // Partial-depth history.
        let (mut stop, done) = self.subs.register(format!("binance:depth:{symbol}"));
        let storage = self.storage.clone();
        let sym = symbol.to_string();
        let request_interval = self.request_interval;
        let ws_timeout = self.ws_timeout;
        tokio::spawn(async move {
            loop {
                if *stop.borrow() {
                    break;
                }
                match ws::run_partial_depth_stream(&sym, &storage, &mut stop, ws_timeout).await {
                    Ok(StreamEnd::Stopped) => break,
                    Ok(_) => {}
                    Err(e) => warn!(symbol = %sym, error = %e, "partial depth stream failed"),
                }
                if sleep_or_stop(request_interval, &mut stop).await {
                    break;
                }
            }
            let _ = done.send(());
        });
    }

    fn spawn_candle_task(&self, symbol: &str, interval: &'static str) {
        let (mut stop, done) = self
            .subs
            .register(format!("binance:kline:{symbol}:{interval}"));
        let storage = self.storage.clone();
        let rest = self.rest.clone();
        let sym = symbol.to_string();
        let request_interval = self.request_interval;
        let ws_timeout = self.ws_timeout;

        tokio::spawn(async move {
            init_candles(&rest, &storage, &sym, interval).await;

            loop {
                if *stop.borrow() {
                    break;
                }
                match ws::run_kline_stream(&sym, interval, &storage, &mut stop, ws_timeout).await {
                    Ok(StreamEnd::Stopped) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(symbol = %sym, interval, error = %e, "kline stream failed")
                    }
                }
                if sleep_or_stop(request_interval, &mut stop).await {
                    break;
                }
            }
            let _ = done.send(());
        });
    }
}

impl Adapter for BinanceWorker {
    fn name(&self) -> &'static str {
        "binance"
    }

    fn start(&self) {
        for symbol in &self.symbols {
            self.spawn_book_tasks(symbol);
            for interval in CANONICAL_INTERVALS {
                self.spawn_candle_task(symbol, interval);
            }
        }
        info!(
            symbols = self.symbols.len(),
            intervals = CANONICAL_INTERVALS.len(),
            "Binance worker started"
        );
    }

    fn reload(&self) {
        for symbol in &self.symbols {
            for interval in CANONICAL_INTERVALS {
                let rest = self.rest.clone();
                let storage = self.storage.clone();
                let sym = symbol.clone();
                tokio::spawn(async move {
                    init_candles(&rest, &storage, &sym, interval).await;
                });
            }
        }
        info!("Binance candle cache reloaded");
    }
}

/// Seed one (symbol, interval) series from REST history, upserting each
/// returned candle at its bucket open time.
async fn init_candles(rest: &BinanceRest, storage: &Storage, symbol: &str, interval: &str) {
    let candles = match rest.klines(symbol, interval, CANDLESTICK_LIMIT).await {
        Ok(candles) => candles,
        Err(e) => {
            error!(symbol, interval, error = %e, "could not load candle history");
            return;
        }
    };

    for candle in &candles {
        if let Err(e) = storage.store_candle("binance", symbol, interval, candle).await {
            error!(symbol, interval, error = %e, "could not store history candle");
        }
    }
}
