// =============================================================================
// Sorted time-series store — thin facade over Redis sorted sets
// =============================================================================
//
// Every series lives in one sorted set whose score carries semantic time
// (Unix seconds for order books, bucket open time for candles) and whose
// members are JSON-encoded normalized values. The handle is cheap to clone
// and safe to share across tasks; the multiplexed connection manager
// serialises commands internally.
//
// Key layout (colon-joined):
//   depth:<symbol>                                  partial-depth snapshots
//   orderBook:<symbol>                              live reconciled books
//   <exchange>:candlestick:<symbol>:<interval>      candles per source
// =============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::models::{Candle, OrderBookApi, OrderBookInternal};

/// Live book snapshots older than this are purged on every write.
const ORDER_BOOK_EXPIRATION: Duration = Duration::from_secs(60);

/// Shared handle to the sorted store.
#[derive(Clone)]
pub struct Storage {
    manager: ConnectionManager,
}

impl Storage {
    /// Connect to the store described by the config block. The connection is
    /// established eagerly so startup fails fast on a bad endpoint.
    pub async fn connect(cfg: &StorageConfig) -> Result<Self> {
        let url = if cfg.password.is_empty() {
            format!("redis://{}/{}", cfg.endpoint, cfg.database)
        } else {
            format!("redis://:{}@{}/{}", cfg.password, cfg.endpoint, cfg.database)
        };

        let client = redis::Client::open(url.as_str())
            .with_context(|| format!("invalid storage endpoint {}", cfg.endpoint))?;
        let manager = client
            .get_connection_manager()
            .await
            .with_context(|| format!("could not connect to storage at {}", cfg.endpoint))?;

        Ok(Self { manager })
    }

    // -------------------------------------------------------------------------
    // Core sorted-set operations
    // -------------------------------------------------------------------------

    /// Add `value` to the sorted set `key` at `score`. Re-adding the same
    /// member is idempotent; distinct members may share a score.
    pub async fn store(&self, key: &str, score: f64, value: &str) -> Result<()> {
        let mut con = self.manager.clone();
        let _: i64 = con
            .zadd(key, value, score)
            .await
            .with_context(|| format!("ZADD {key} failed"))?;
        Ok(())
    }

    /// Inclusive index range; negative indices count from the end.
    pub async fn range_by_index(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>> {
        let mut con = self.manager.clone();
        con.zrange(key, start, stop)
            .await
            .with_context(|| format!("ZRANGE {key} failed"))
    }

    /// Inclusive score window, ascending.
    pub async fn range_by_score(&self, key: &str, min: f64, max: f64) -> Result<Vec<String>> {
        let mut con = self.manager.clone();
        con.zrangebyscore(key, min, max)
            .await
            .with_context(|| format!("ZRANGEBYSCORE {key} failed"))
    }

    /// Remove every member whose score falls in the inclusive window.
    pub async fn purge(&self, key: &str, min: f64, max: f64) -> Result<()> {
        let mut con = self.manager.clone();
        let removed: i64 = con
            .zrembyscore(key, min, max)
            .await
            .with_context(|| format!("ZREMRANGEBYSCORE {key} failed"))?;
        if removed > 0 {
            debug!(key, removed, "purged score range");
        }
        Ok(())
    }

    /// Round-trip check; startup treats a failure as fatal.
    pub async fn ping(&self) -> Result<String> {
        let mut con = self.manager.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut con)
            .await
            .context("storage PING failed")
    }

    /// Drop everything in the selected database.
    pub async fn flush(&self) -> Result<()> {
        let mut con = self.manager.clone();
        redis::cmd("FLUSHDB")
            .query_async::<_, ()>(&mut con)
            .await
            .context("storage FLUSHDB failed")
    }

    // -------------------------------------------------------------------------
    // Typed helpers
    // -------------------------------------------------------------------------

    /// Append a partial-depth frame to the `depth:<symbol>` history.
    pub async fn store_depth_snapshot(&self, symbol: &str, book: &OrderBookApi) -> Result<()> {
        let data = serde_json::to_string(book).context("could not encode depth snapshot")?;
        self.store(&format_key(&["depth", symbol]), Utc::now().timestamp() as f64, &data)
            .await
    }

    /// Persist the live reconciled book, expiring snapshots older than one
    /// minute on the same key first.
    pub async fn store_order_book(&self, symbol: &str, book: &OrderBookInternal) -> Result<()> {
        let key = format_key(&["orderBook", symbol]);
        let now = Utc::now().timestamp();
        let cutoff = now - ORDER_BOOK_EXPIRATION.as_secs() as i64;

        self.purge(&key, 0.0, cutoff as f64).await?;

        let data = serde_json::to_string(book).context("could not encode order book")?;
        self.store(&key, now as f64, &data).await
    }

    /// Load the most recent reconciled book for `symbol`, formatted to
    /// `depth`. An empty series yields an empty book.
    pub async fn load_order_book(&self, symbol: &str, depth: usize) -> Result<OrderBookApi> {
        let key = format_key(&["orderBook", symbol]);
        let members = self.range_by_index(&key, -1, -1).await?;

        let Some(raw) = members.first() else {
            return Ok(OrderBookApi::default());
        };

        let book: OrderBookInternal = serde_json::from_str(raw)
            .with_context(|| format!("could not decode order book member on {key}"))?;
        Ok(book.format(depth))
    }

    /// Upsert a candle: exactly one member survives per bucket open time, the
    /// one written last.
    pub async fn store_candle(
        &self,
        exchange: &str,
        symbol: &str,
        interval: &str,
        candle: &Candle,
    ) -> Result<()> {
        let key = format_key(&[exchange, "candlestick", symbol, interval]);
        let score = candle.time_start as f64;

        self.purge(&key, score, score).await?;

        let data = serde_json::to_string(candle).context("could not encode candle")?;
        self.store(&key, score, &data).await
    }

    /// Range-scan one exchange's candle series. Members that fail to decode
    /// are logged and skipped.
    pub async fn load_candles(
        &self,
        exchange: &str,
        symbol: &str,
        interval: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<Candle>> {
        let key = format_key(&[exchange, "candlestick", symbol, interval]);
        let members = self.range_by_score(&key, min, max).await?;

        let mut candles = Vec::with_capacity(members.len());
        for raw in &members {
            match serde_json::from_str::<Candle>(raw) {
                Ok(candle) => candles.push(candle),
                Err(e) => warn!(key, error = %e, "skipping undecodable candle member"),
            }
        }
        Ok(candles)
    }
}

/// Join key parts with colons: `["binance", "candlestick", "LTCBTC", "1m"]`
/// becomes `binance:candlestick:LTCBTC:1m`.
pub fn format_key(parts: &[&str]) -> String {
    parts.join(":")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout() {
        assert_eq!(format_key(&["depth", "LTCBTC"]), "depth:LTCBTC");
        assert_eq!(format_key(&["orderBook", "ETHBTC"]), "orderBook:ETHBTC");
        assert_eq!(
            format_key(&["binance", "candlestick", "LTCBTC", "1m"]),
            "binance:candlestick:LTCBTC:1m"
        );
    }

    #[test]
    fn format_key_single_part() {
        assert_eq!(format_key(&["depth"]), "depth");
    }

    /// Runs against a live local store; excluded from the default run. Use
    /// `cargo test -- --ignored` with Redis listening on 127.0.0.1:6379.
    #[tokio::test]
    #[ignore]
    async fn live_store_roundtrip() {
        let cfg = StorageConfig {
            endpoint: "127.0.0.1:6379".to_string(),
            password: String::new(),
            // Scratch database; this test flushes it on entry and exit.
            database: 15,
            pool_size: 2,
        };

        let storage = Storage::connect(&cfg).await.unwrap();
        assert_eq!(storage.ping().await.unwrap(), "PONG");
        storage.flush().await.unwrap();

        // Core sorted-set semantics.
        storage.store("series", 1.0, "a").await.unwrap();
        storage.store("series", 2.0, "b").await.unwrap();
        storage.store("series", 2.0, "b").await.unwrap(); // idempotent re-add
        storage.store("series", 3.0, "c").await.unwrap();

        assert_eq!(
            storage.range_by_score("series", 1.0, 2.0).await.unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            storage.range_by_index("series", -1, -1).await.unwrap(),
            vec!["c"]
        );

        storage.purge("series", 1.0, 2.0).await.unwrap();
        assert_eq!(
            storage.range_by_score("series", 0.0, 10.0).await.unwrap(),
            vec!["c"]
        );

        // Upsert by bucket: exactly one member survives per open time, the
        // one written last.
        let mut candle = Candle {
            time_start: 100,
            time_end: 160,
            time: 100,
            open: 1.0,
            close: 2.0,
            high: 3.0,
            low: 0.5,
            volume: 10.0,
        };
        storage
            .store_candle("binance", "LTCBTC", "1m", &candle)
            .await
            .unwrap();
        candle.close = 4.0;
        storage
            .store_candle("binance", "LTCBTC", "1m", &candle)
            .await
            .unwrap();

        let candles = storage
            .load_candles("binance", "LTCBTC", "1m", 0.0, 1000.0)
            .await
            .unwrap();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].close, 4.0);

        storage.flush().await.unwrap();
    }
}
