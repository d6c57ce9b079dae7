// =============================================================================
// pricefeed — Main Entry Point
// =============================================================================
//
// Multi-exchange market-data aggregator: Binance order books are reconciled
// from snapshot + diff streams, candlesticks are ingested from Binance,
// Bittrex and Poloniex, everything lands in a Redis-backed sorted store, and
// a small HTTP API serves the latest book and merged candle ranges.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod config;
mod exchanges;
mod logger;
mod models;
mod storage;

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use crate::api::ApiState;
use crate::config::Config;
use crate::exchanges::binance::BinanceWorker;
use crate::exchanges::bittrex::BittrexWorker;
use crate::exchanges::poloniex::PoloniexWorker;
use crate::exchanges::Adapter;
use crate::storage::Storage;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Config & logger ───────────────────────────────────────────────
    let config = Config::from_args()?;
    logger::init(&config.logger)?;

    info!(
        port = config.api.port,
        storage = %config.storage.endpoint,
        "pricefeed starting up"
    );

    // ── 2. Storage ───────────────────────────────────────────────────────
    let storage = match Storage::connect(&config.storage).await {
        Ok(storage) => storage,
        Err(e) => {
            error!(error = %e, "could not establish storage connection");
            return Err(e);
        }
    };

    let pong = match storage.ping().await {
        Ok(pong) => pong,
        Err(e) => {
            error!(error = %e, "storage check failed");
            return Err(e);
        }
    };
    info!(reply = %pong, "storage check passed");

    // ── 3. Exchange workers ──────────────────────────────────────────────
    let binance = Arc::new(BinanceWorker::new(&config.binance, storage.clone())?);
    let bittrex = Arc::new(BittrexWorker::new(&config.bittrex, storage.clone())?);
    let poloniex = Arc::new(PoloniexWorker::new(&config.poloniex, storage.clone())?);

    binance.start();
    bittrex.start();
    poloniex.start();

    // ── 4. API server ────────────────────────────────────────────────────
    let api_state = Arc::new(ApiState {
        token: config.api.token.clone(),
        storage: storage.clone(),
        adapters: vec![
            binance.clone() as Arc<dyn Adapter>,
            bittrex.clone() as Arc<dyn Adapter>,
            poloniex.clone() as Arc<dyn Adapter>,
        ],
    });

    let api_port = config.api.port;
    tokio::spawn(async move {
        if let Err(e) = api::serve(api_port, api_state).await {
            error!(error = %e, "API server error");
            std::process::exit(1);
        }
    });

    info!("all subsystems running");

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c()
        .await
        .context("could not listen for the interrupt signal")?;
    warn!("shutdown signal received, stopping workers");

    binance.stop_all().await;
    bittrex.stop_all().await;
    poloniex.stop_all().await;

    info!("pricefeed shut down complete");
    Ok(())
}
