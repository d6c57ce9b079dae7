// =============================================================================
// Read API — Axum 0.7
// =============================================================================
//
// Three endpoints under `/api/v1`: the latest order book at a requested
// depth, a candlestick range merged across exchanges, and an administrative
// reload gated by a shared-secret token. CORS is permissive; the data is
// public read-only.
// =============================================================================

pub mod candles;
pub mod orderbook;
pub mod reload;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::exchanges::Adapter;
use crate::storage::Storage;

/// Shared handler state.
pub struct ApiState {
    /// Shared secret for `/reload`.
    pub token: String,
    pub storage: Storage,
    /// Workers in fixed order; `/reload` triggers each.
    pub adapters: Vec<Arc<dyn Adapter>>,
}

/// Build the router with CORS and shared state.
pub fn router(state: Arc<ApiState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/orderBook", get(orderbook::handle))
        .route("/api/v1/candles", get(candles::handle))
        .route("/api/v1/reload", get(reload::handle))
        .layer(cors)
        .with_state(state)
}

/// Bind and serve until the process shuts down.
pub async fn serve(port: u16, state: Arc<ApiState>) -> Result<()> {
    let app = router(state);
    let addr = format!("0.0.0.0:{port}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind API server to {addr}"))?;
    info!(addr, "API server listening");

    axum::serve(listener, app).await.context("API server failed")
}
