// =============================================================================
// GET /api/v1/candles — candlestick range merged across exchanges
// =============================================================================
//
// The requested start time is aligned down to its interval bucket, all three
// per-exchange series are range-scanned in the fixed merge order and fused by
// bucket open time. The response echoes the raw request times multiplied by
// 1000, which existing clients rely on.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::error;

use crate::api::ApiState;
use crate::models::intervals::{align_time_start, is_valid_interval};
use crate::models::{merge_candles, CandlestickResponse};

/// Exchanges in merge order; the running open/close averages fold in this
/// sequence.
const MERGE_ORDER: [&str; 3] = ["binance", "bittrex", "poloniex"];

#[derive(Debug, PartialEq)]
struct CandleQuery {
    symbol: String,
    interval: String,
    time_start: i64,
    time_end: i64,
}

pub async fn handle(
    State(state): State<Arc<ApiState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let query = match parse_query(&params) {
        Ok(query) => query,
        Err((status, msg)) => return (status, msg).into_response(),
    };

    let aligned_start = align_time_start(query.time_start, &query.interval) as f64;
    let mut series = Vec::with_capacity(MERGE_ORDER.len());

    for exchange in MERGE_ORDER {
        match state
            .storage
            .load_candles(
                exchange,
                &query.symbol,
                &query.interval,
                aligned_start,
                query.time_end as f64,
            )
            .await
        {
            Ok(candles) => series.push(candles),
            Err(e) => {
                error!(exchange, symbol = %query.symbol, error = %e, "could not load candles");
                return (StatusCode::INTERNAL_SERVER_ERROR, "could not load candles")
                    .into_response();
            }
        }
    }

    let response = CandlestickResponse {
        time_start: query.time_start * 1000,
        time_end: query.time_end * 1000,
        candles: merge_candles(series),
    };

    (
        [(header::ACCESS_CONTROL_ALLOW_ORIGIN, "*")],
        Json(response),
    )
        .into_response()
}

fn parse_query(
    params: &HashMap<String, String>,
) -> Result<CandleQuery, (StatusCode, &'static str)> {
    let symbol = params
        .get("symbol")
        .filter(|s| !s.is_empty())
        .ok_or((StatusCode::BAD_REQUEST, "no symbol specified"))?;

    let interval = params
        .get("interval")
        .ok_or((StatusCode::BAD_REQUEST, "no interval specified"))?;
    if !is_valid_interval(interval) {
        return Err((StatusCode::BAD_REQUEST, "interval is invalid"));
    }

    let time_start = params
        .get("timeStart")
        .ok_or((StatusCode::BAD_REQUEST, "no timeStart specified"))?
        .parse::<i64>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "timeStart is not a number"))?;

    let time_end = params
        .get("timeEnd")
        .ok_or((StatusCode::BAD_REQUEST, "no timeEnd specified"))?
        .parse::<i64>()
        .map_err(|_| (StatusCode::BAD_REQUEST, "timeEnd is not a number"))?;

    Ok(CandleQuery {
        symbol: symbol.clone(),
        interval: interval.clone(),
        time_start,
        time_end,
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_query() -> HashMap<String, String> {
        query(&[
            ("symbol", "ETHBTC"),
            ("interval", "1h"),
            ("timeStart", "1700000000"),
            ("timeEnd", "1700003600"),
        ])
    }

    #[test]
    fn valid_query_parses() {
        let parsed = parse_query(&full_query()).unwrap();
        assert_eq!(
            parsed,
            CandleQuery {
                symbol: "ETHBTC".to_string(),
                interval: "1h".to_string(),
                time_start: 1_700_000_000,
                time_end: 1_700_003_600,
            }
        );
    }

    #[test]
    fn each_missing_parameter_is_rejected() {
        for key in ["symbol", "interval", "timeStart", "timeEnd"] {
            let mut params = full_query();
            params.remove(key);
            let (status, _) = parse_query(&params).unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST, "missing {key}");
        }
    }

    #[test]
    fn non_canonical_interval_is_rejected() {
        for bad in ["2m", "60", "hour", "1H"] {
            let mut params = full_query();
            params.insert("interval".to_string(), bad.to_string());
            let (status, msg) = parse_query(&params).unwrap_err();
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(msg, "interval is invalid");
        }
    }

    #[test]
    fn non_numeric_times_are_rejected() {
        let mut params = full_query();
        params.insert("timeStart".to_string(), "yesterday".to_string());
        let (_, msg) = parse_query(&params).unwrap_err();
        assert_eq!(msg, "timeStart is not a number");

        let mut params = full_query();
        params.insert("timeEnd".to_string(), "tomorrow".to_string());
        let (_, msg) = parse_query(&params).unwrap_err();
        assert_eq!(msg, "timeEnd is not a number");
    }

    #[test]
    fn response_times_echo_request_times_in_ms() {
        // The stored candles stay in seconds; only the echoed range is
        // multiplied.
        let q = parse_query(&full_query()).unwrap();
        assert_eq!(q.time_start * 1000, 1_700_000_000_000);
        assert_eq!(q.time_end * 1000, 1_700_003_600_000);
    }
}
