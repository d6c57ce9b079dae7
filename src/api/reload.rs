// =============================================================================
// GET /api/v1/reload — re-fetch candle history on every adapter
// =============================================================================
//
// Gated by the shared secret from the `api.token` config field, passed as a
// `token` query parameter. The comparison runs in constant time.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{debug, info, warn};

use crate::api::ApiState;

pub async fn handle(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let Some(token) = params.get("token") else {
        return (StatusCode::BAD_REQUEST, "no token specified").into_response();
    };

    if !constant_time_eq(token.as_bytes(), state.token.as_bytes()) {
        warn!("reload requested with an invalid token");
        return (StatusCode::UNAUTHORIZED, "token is invalid").into_response();
    }

    for adapter in &state.adapters {
        debug!(adapter = adapter.name(), "triggering reload");
        adapter.reload();
    }
    info!(adapters = state.adapters.len(), "reload triggered");

    StatusCode::OK.into_response()
}

/// Compare two byte slices in constant time. Every byte of equal-length
/// inputs is examined even after a mismatch is found.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

// =============================================================================
// Tests
// =============================================================================
