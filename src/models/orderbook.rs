// =============================================================================
// Order-book data model — internal (textual) and API (numeric) forms
// =============================================================================
//
// The internal form mirrors what the exchange sends: price and size stay
// textual decimals so nothing is lost on the hot path, and the book is a map
// from price to size per side. The API form is what the read endpoint serves:
// numeric levels, sorted, truncated to the requested depth.
// =============================================================================

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A size of exactly this literal marks a level deletion in depth diffs.
pub const ZERO_SIZE: &str = "0.00000000";

/// Best-effort decimal parse. Samples that fail to parse are dropped by the
/// caller; a malformed level never propagates a fault.
pub fn parse_f64(s: &str) -> Option<f64> {
    s.parse::<f64>().ok()
}

// ---------------------------------------------------------------------------
// API form
// ---------------------------------------------------------------------------

/// One price level on the read API.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AskBid {
    pub price: f64,
    pub size: f64,
}

/// Order book as served by the read API: both sides sorted by ascending
/// price, truncated to the caller's depth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderBookApi {
    pub asks: Vec<AskBid>,
    pub bids: Vec<AskBid>,
}

// ---------------------------------------------------------------------------
// Internal form
// ---------------------------------------------------------------------------

/// Live reconciled book for one symbol. `last_update_id` is the sequence
/// high-water mark and is not persisted; the side maps carry textual decimals
/// exactly as received.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBookInternal {
    #[serde(skip)]
    pub last_update_id: i64,
    pub bids: HashMap<String, String>,
    pub asks: HashMap<String, String>,
}

impl OrderBookInternal {
    /// Format the internal book for the read API at the given depth.
    ///
    /// Unparseable levels are dropped. Both sides sort by ascending price;
    /// asks keep the first `depth` entries (lowest prices) and bids keep the
    /// highest-price suffix of length `depth`.
    pub fn format(&self, depth: usize) -> OrderBookApi {
        let mut asks = parse_side(&self.asks);
        let mut bids = parse_side(&self.bids);

        asks.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
        bids.sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));

        asks.truncate(depth);
        let bids_keep = depth.min(bids.len());
        let bids = bids.split_off(bids.len() - bids_keep);

        OrderBookApi { asks, bids }
    }
}

fn parse_side(side: &HashMap<String, String>) -> Vec<AskBid> {
    side.iter()
        .filter_map(|(price, size)| {
            Some(AskBid {
                price: parse_f64(price)?,
                size: parse_f64(size)?,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// REST depth snapshot
// ---------------------------------------------------------------------------

/// Wire shape of the exchange depth snapshot endpoint: levels come as
/// `[price, size]` string pairs.
#[derive(Debug, Clone, Deserialize)]
pub struct DepthSnapshot {
    #[serde(rename = "lastUpdateId")]
    pub last_update_id: i64,
    pub bids: Vec<[String; 2]>,
    pub asks: Vec<[String; 2]>,
}

impl From<DepthSnapshot> for OrderBookInternal {
    fn from(snapshot: DepthSnapshot) -> Self {
        let into_side = |levels: Vec<[String; 2]>| {
            levels
                .into_iter()
                .map(|[price, size]| (price, size))
                .collect::<HashMap<_, _>>()
        };

        Self {
            last_update_id: snapshot.last_update_id,
            bids: into_side(snapshot.bids),
            asks: into_side(snapshot.asks),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn side(levels: &[(&str, &str)]) -> HashMap<String, String> {
        levels
            .iter()
            .map(|(p, s)| (p.to_string(), s.to_string()))
            .collect()
    }

    #[test]
    fn format_sorts_and_truncates_both_sides() {
        let book = OrderBookInternal {
            last_update_id: 42,
            asks: side(&[("0.01", "1"), ("0.02", "2"), ("0.03", "3")]),
            bids: side(&[("0.009", "5"), ("0.008", "4")]),
        };

        let api = book.format(2);

        assert_eq!(
            api.asks,
            vec![
                AskBid { price: 0.01, size: 1.0 },
                AskBid { price: 0.02, size: 2.0 },
            ]
        );
        // Bids keep the highest-price suffix, still ascending.
        assert_eq!(
            api.bids,
            vec![
                AskBid { price: 0.008, size: 4.0 },
                AskBid { price: 0.009, size: 5.0 },
            ]
        );
    }

    #[test]
    fn format_with_depth_larger_than_book() {
        let book = OrderBookInternal {
            last_update_id: 0,
            asks: side(&[("1.5", "10")]),
            bids: side(&[("1.4", "20")]),
        };

        let api = book.format(100);
        assert_eq!(api.asks.len(), 1);
        assert_eq!(api.bids.len(), 1);
    }

    #[test]
    fn format_drops_unparseable_levels() {
        let book = OrderBookInternal {
            last_update_id: 0,
            asks: side(&[("0.01", "1"), ("garbage", "2"), ("0.02", "nope")]),
            bids: side(&[("0.009", "5")]),
        };

        let api = book.format(10);
        assert_eq!(api.asks, vec![AskBid { price: 0.01, size: 1.0 }]);
        assert_eq!(api.bids.len(), 1);
    }

    #[test]
    fn format_empty_book() {
        let api = OrderBookInternal::default().format(5);
        assert!(api.asks.is_empty());
        assert!(api.bids.is_empty());
    }

    #[test]
    fn snapshot_conversion_keeps_sequence_and_levels() {
        let raw = r#"{
            "lastUpdateId": 1027024,
            "bids": [["4.00000000", "431.00000000"]],
            "asks": [["4.00000200", "12.00000000"], ["4.10000000", "2.00000000"]]
        }"#;
        let snapshot: DepthSnapshot = serde_json::from_str(raw).unwrap();
        let book: OrderBookInternal = snapshot.into();

        assert_eq!(book.last_update_id, 1_027_024);
        assert_eq!(book.bids.get("4.00000000").map(String::as_str), Some("431.00000000"));
        assert_eq!(book.asks.len(), 2);
    }

    #[test]
    fn internal_book_roundtrips_without_sequence() {
        let book = OrderBookInternal {
            last_update_id: 7,
            asks: side(&[("0.01", "1")]),
            bids: side(&[("0.009", "2")]),
        };

        let encoded = serde_json::to_string(&book).unwrap();
        // The sequence number is process state, never persisted.
        assert!(!encoded.contains("last_update_id"));

        let decoded: OrderBookInternal = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.last_update_id, 0);
        assert_eq!(decoded.asks, book.asks);
        assert_eq!(decoded.bids, book.bids);
    }

    #[test]
    fn api_book_roundtrips() {
        let api = OrderBookApi {
            asks: vec![AskBid { price: 0.01, size: 1.0 }],
            bids: vec![AskBid { price: 0.009, size: 2.5 }],
        };
        let decoded: OrderBookApi =
            serde_json::from_str(&serde_json::to_string(&api).unwrap()).unwrap();
        assert_eq!(decoded, api);
    }

    #[test]
    fn parse_f64_is_best_effort() {
        assert_eq!(parse_f64("0.00000001"), Some(0.00000001));
        assert_eq!(parse_f64("1e-8"), Some(1e-8));
        assert_eq!(parse_f64("abc"), None);
        assert_eq!(parse_f64(""), None);
    }
}
