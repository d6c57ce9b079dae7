// =============================================================================
// Candlestick interval vocabulary — canonical set and per-exchange mappings
// =============================================================================
//
// The canonical vocabulary is the Binance one; Bittrex tick intervals and
// Poloniex chart periods are translated into it. Translation is total: an
// unknown input maps to the empty string and the caller skips the sample.
// =============================================================================

use chrono::{Datelike, TimeZone, Utc};

/// Canonical interval set. Storage keys, the WebSocket kline subscriptions and
/// the `/candles` validation all use exactly these strings.
pub const CANONICAL_INTERVALS: [&str; 15] = [
    "1m", "3m", "5m", "15m", "30m", "1h", "2h", "4h", "6h", "8h", "12h", "1d", "3d", "1w", "1M",
];

/// Bittrex tick intervals the poller subscribes to.
pub const BITTREX_INTERVALS: [&str; 5] = ["oneMin", "fiveMin", "thirtyMin", "hour", "day"];

/// Poloniex chart periods (seconds) the poller subscribes to.
pub const POLONIEX_PERIODS: [u32; 6] = [300, 900, 1800, 7200, 14400, 86400];

pub fn is_valid_interval(s: &str) -> bool {
    CANONICAL_INTERVALS.contains(&s)
}

/// Translate a Bittrex tick interval into the canonical vocabulary.
/// Unknown intervals yield `""`.
pub fn bittrex_interval_to_canonical(v: &str) -> &'static str {
    match v {
        "oneMin" => "1m",
        "fiveMin" => "5m",
        "thirtyMin" => "30m",
        "hour" => "1h",
        "day" => "1d",
        _ => "",
    }
}

/// Translate a Poloniex chart period (seconds) into the canonical vocabulary.
/// Unknown periods yield `""`.
pub fn poloniex_interval_to_canonical(period: u32) -> &'static str {
    match period {
        300 => "5m",
        900 => "15m",
        1800 => "30m",
        7200 => "2h",
        14400 => "4h",
        86400 => "1d",
        _ => "",
    }
}

/// Width of a canonical interval in seconds. `1M` has no fixed width and
/// returns `None`; callers align it on calendar months instead.
pub fn interval_seconds(interval: &str) -> Option<i64> {
    let secs = match interval {
        "1m" => 60,
        "3m" => 3 * 60,
        "5m" => 5 * 60,
        "15m" => 15 * 60,
        "30m" => 30 * 60,
        "1h" => 3600,
        "2h" => 2 * 3600,
        "4h" => 4 * 3600,
        "6h" => 6 * 3600,
        "8h" => 8 * 3600,
        "12h" => 12 * 3600,
        "1d" => 86_400,
        "3d" => 3 * 86_400,
        "1w" => 7 * 86_400,
        _ => return None,
    };
    Some(secs)
}

/// Truncate a Unix timestamp down to the open of its interval bucket.
///
/// Fixed-width intervals truncate toward zero against the epoch; `1M` snaps
/// to the first of the month at 00:00:00 UTC. An unknown interval is returned
/// unchanged (the caller has already validated it).
pub fn align_time_start(time_start: i64, interval: &str) -> i64 {
    if interval == "1M" {
        let dt = match Utc.timestamp_opt(time_start, 0).single() {
            Some(dt) => dt,
            None => return time_start,
        };
        return Utc
            .with_ymd_and_hms(dt.year(), dt.month(), 1, 0, 0, 0)
            .single()
            .map(|d| d.timestamp())
            .unwrap_or(time_start);
    }

    match interval_seconds(interval) {
        Some(secs) if secs > 0 => time_start - time_start.rem_euclid(secs),
        _ => time_start,
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_set_validation() {
        for iv in CANONICAL_INTERVALS {
            assert!(is_valid_interval(iv), "{iv} should be valid");
        }
        assert!(!is_valid_interval("2m"));
        assert!(!is_valid_interval("1mo"));
        assert!(!is_valid_interval(""));
        assert!(!is_valid_interval("1M "));
    }

    #[test]
    fn bittrex_mapping_is_total() {
        assert_eq!(bittrex_interval_to_canonical("oneMin"), "1m");
        assert_eq!(bittrex_interval_to_canonical("fiveMin"), "5m");
        assert_eq!(bittrex_interval_to_canonical("thirtyMin"), "30m");
        assert_eq!(bittrex_interval_to_canonical("hour"), "1h");
        assert_eq!(bittrex_interval_to_canonical("day"), "1d");
        assert_eq!(bittrex_interval_to_canonical("tenMin"), "");
    }

    #[test]
    fn poloniex_mapping_is_total() {
        assert_eq!(poloniex_interval_to_canonical(300), "5m");
        assert_eq!(poloniex_interval_to_canonical(900), "15m");
        assert_eq!(poloniex_interval_to_canonical(1800), "30m");
        assert_eq!(poloniex_interval_to_canonical(7200), "2h");
        assert_eq!(poloniex_interval_to_canonical(14400), "4h");
        assert_eq!(poloniex_interval_to_canonical(86400), "1d");
        assert_eq!(poloniex_interval_to_canonical(60), "");
    }

    #[test]
    fn every_mapped_interval_is_canonical() {
        for iv in BITTREX_INTERVALS {
            assert!(is_valid_interval(bittrex_interval_to_canonical(iv)));
        }
        for p in POLONIEX_PERIODS {
            assert!(is_valid_interval(poloniex_interval_to_canonical(p)));
        }
    }

    #[test]
    fn align_truncates_fixed_intervals() {
        // 1700000000 = 2023-11-14 22:13:20 UTC
        assert_eq!(align_time_start(1_700_000_000, "1h"), 1_699_999_200);
        assert_eq!(align_time_start(1_700_000_000, "1m"), 1_699_999_980);
        assert_eq!(align_time_start(1_700_000_000, "1d"), 1_699_920_000);
        // Already aligned stays put.
        assert_eq!(align_time_start(1_699_999_200, "1h"), 1_699_999_200);
    }

    #[test]
    fn align_month_snaps_to_first_midnight() {
        // 2023-11-14 22:13:20 UTC -> 2023-11-01 00:00:00 UTC
        assert_eq!(align_time_start(1_700_000_000, "1M"), 1_698_796_800);
    }

    #[test]
    fn align_passes_unknown_interval_through() {
        assert_eq!(align_time_start(12_345, "7m"), 12_345);
    }
}
