// =============================================================================
// GET /api/v1/orderBook — latest reconciled book at the requested depth
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::api::ApiState;
use crate::models::OrderBookApi;

#[derive(Serialize)]
struct OrderBookResponse {
    symbol: String,
    #[serde(flatten)]
    book: OrderBookApi,
}

pub async fn handle(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let (symbol, depth) = match parse_query(&params) {
        Ok(parsed) => parsed,
        Err((status, msg)) => return (status, msg).into_response(),
    };

    let book = match state.storage.load_order_book(&symbol, depth).await {
        Ok(book) => book,
        Err(e) => {
            error!(symbol, error = %e, "could not load order book");
            return (StatusCode::INTERNAL_SERVER_ERROR, "could not load order book")
                .into_response();
        }
    };

    Json(OrderBookResponse { symbol, book }).into_response()
}

fn parse_query(
    params: &HashMap<String, String>,
) -> Result<(String, usize), (StatusCode, &'static str)> {
    let symbol = params
        .get("symbol")
        .filter(|s| !s.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "no symbol specified"))?;

    let depth = params
        .get("depth")
        .ok_or((StatusCode::BAD_REQUEST, "no depth specified"))?
        .parse::<usize>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "depth should be a number"))?;

    Ok((symbol.clone(), depth))
}

// =============================================================================
// Tests
// =============================================================================
