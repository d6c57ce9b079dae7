// =============================================================================
// Order-book reconciler — snapshot + diff stream with sequence discipline
// =============================================================================
//
// Per symbol: open the diff stream (events buffer in a bounded channel),
// fetch a REST snapshot, then drain the channel applying every event whose
// sequence number is beyond the snapshot. A zero-size level is a deletion.
// After each applied event the book is persisted; persistence failure is
// logged and never stops reconciliation. When the stream ends the outer loop
// reconnects after the request interval.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, info, warn};

use crate::exchanges::binance::rest::{BinanceRest, ORDER_BOOK_MAX_LIMIT};
use crate::exchanges::binance::ws::{run_depth_stream, DepthEvent, StreamEnd};
use crate::exchanges::sleep_or_stop;
use crate::models::{OrderBookInternal, ZERO_SIZE};
use crate::storage::Storage;

/// Depth events buffered between the stream reader and the reconciler. When
/// full, the reader awaits; the per-symbol single-reader pattern keeps that
/// bounded.
const DEPTH_EVENT_BUFFER: usize = 10_000;

/// Shared live-book cache, one map for all symbols behind a single mutex.
pub type BookCache = Arc<Mutex<HashMap<String, OrderBookInternal>>>;

/// Apply a diff event to a book. Events at or below the book's sequence
/// high-water mark are dropped; otherwise every level is set, or removed when
/// its size is the zero sentinel, and the mark advances to the event's `u`.
///
/// Returns whether the event was applied.
pub fn apply_depth_event(book: &mut OrderBookInternal, event: &DepthEvent) -> bool {
    if event.last_update_id <= book.last_update_id {
        return false;
    }

    for [price, size] in &event.bids {
        if size == ZERO_SIZE {
            book.bids.remove(price);
        } else {
            book.bids.insert(price.clone(), size.clone());
        }
    }

    for [price, size] in &event.asks {
        if size == ZERO_SIZE {
            book.asks.remove(price);
        } else {
            book.asks.insert(price.clone(), size.clone());
        }
    }

    book.last_update_id = event.last_update_id;
    true
}

/// Reconciles one live book per symbol against the diff stream.
pub struct BookReconciler {
    cache: BookCache,
    storage: Storage,
    rest: BinanceRest,
    request_interval: Duration,
    ws_timeout: Duration,
}

impl BookReconciler {
    pub fn new(
        cache: BookCache,
        storage: Storage,
        rest: BinanceRest,
        request_interval: Duration,
        ws_timeout: Duration,
    ) -> Self {
        Self {
            cache,
            storage,
            rest,
            request_interval,
            ws_timeout,
        }
    }

    /// Current book for a symbol, if one has been reconciled.
    pub fn get(&self, symbol: &str) -> Option<OrderBookInternal> {
        self.cache.lock().get(symbol).cloned()
    }

    /// Long-running per-symbol loop: run sessions until stopped, reconnecting
    /// after `request_interval` on failure or stream end.
    pub async fn run(
        self: Arc<Self>,
        symbol: String,
        mut stop: watch::Receiver<bool>,
        done: oneshot::Sender<()>,
    ) {
        info!(symbol = %symbol, "order book reconciler starting");

        loop {
            if *stop.borrow() {
                break;
            }

            match self.session(&symbol, &mut stop).await {
                Ok(StreamEnd::Stopped) => break,
                Ok(StreamEnd::Closed) | Ok(StreamEnd::TimedOut) => {}
                Err(e) => warn!(symbol = %symbol, error = %e, "order book session failed"),
            }

            if sleep_or_stop(self.request_interval, &mut stop).await {
                break;
            }
        }

        info!(symbol = %symbol, "order book reconciler stopped");
        let _ = done.send(());
    }

    /// One stream session: buffer diffs, snapshot, drain and apply.
    async fn session(&self, symbol: &str, stop: &mut watch::Receiver<bool>) -> Result<StreamEnd> {
        let (tx, mut rx) = mpsc::channel::<DepthEvent>(DEPTH_EVENT_BUFFER);

        // Open the stream first so no diff between snapshot and subscribe is
        // lost; events accumulate in the channel until the snapshot lands.
        let stream_symbol = symbol.to_string();
        let mut stream_stop = stop.clone();
        let ws_timeout = self.ws_timeout;
        let stream_task = tokio::spawn(async move {
            run_depth_stream(&stream_symbol, &tx, &mut stream_stop, ws_timeout).await
        });

        let snapshot = match self.rest.depth_snapshot(symbol, ORDER_BOOK_MAX_LIMIT).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                stream_task.abort();
                return Err(e);
            }
        };
        self.cache.lock().insert(symbol.to_string(), snapshot);

        // Buffered events at or below the snapshot's lastUpdateId fall to the
        // sequence check inside apply; the rest apply in arrival order.
        while let Some(event) = rx.recv().await {
            self.apply_and_persist(symbol, &event).await;
        }

        match stream_task.await {
            Ok(end) => end,
            Err(e) => Err(anyhow::anyhow!("depth stream task failed: {e}")),
        }
    }

    /// Apply one event under the cache lock, then persist a clone of the book
    /// with the lock released.
    async fn apply_and_persist(&self, symbol: &str, event: &DepthEvent) {
        let book = {
            let mut cache = self.cache.lock();
            let Some(book) = cache.get_mut(symbol) else {
                return;
            };
            if !apply_depth_event(book, event) {
                return;
            }
            book.clone()
        };

        if let Err(e) = self.storage.store_order_book(symbol, &book).await {
            error!(symbol, error = %e, "could not persist order book");
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn event(u: i64, bids: &[(&str, &str)], asks: &[(&str, &str)]) -> DepthEvent {
        DepthEvent {
            event_time: u * 1000,
            symbol: "LTCBTC".to_string(),
            first_update_id: u,
            last_update_id: u,
            bids: bids
                .iter()
                .map(|(p, s)| [p.to_string(), s.to_string()])
                .collect(),
            asks: asks
                .iter()
                .map(|(p, s)| [p.to_string(), s.to_string()])
                .collect(),
        }
    }

    fn snapshot_book(last_update_id: i64) -> OrderBookInternal {
        let mut book = OrderBookInternal::default();
        book.last_update_id = last_update_id;
        book.bids.insert("0.009".to_string(), "5".to_string());
        book.asks.insert("0.010".to_string(), "1".to_string());
        book
    }

    #[test]
    fn event_at_snapshot_sequence_is_dropped() {
        let mut book = snapshot_book(100);
        let applied = apply_depth_event(&mut book, &event(100, &[("0.008", "9")], &[]));

        assert!(!applied);
        assert_eq!(book.last_update_id, 100);
        assert!(!book.bids.contains_key("0.008"));
    }

    #[test]
    fn event_past_snapshot_sequence_applies() {
        let mut book = snapshot_book(100);
        let applied = apply_depth_event(&mut book, &event(101, &[("0.008", "9")], &[]));

        assert!(applied);
        assert_eq!(book.last_update_id, 101);
        assert_eq!(book.bids.get("0.008").map(String::as_str), Some("9"));
    }

    #[test]
    fn sequence_mark_tracks_maximum_applied() {
        let mut book = snapshot_book(0);
        for u in [5, 9, 12] {
            apply_depth_event(&mut book, &event(u, &[("0.001", "1")], &[]));
        }
        // A stale event after the fact changes nothing.
        assert!(!apply_depth_event(&mut book, &event(7, &[("0.002", "2")], &[])));

        assert_eq!(book.last_update_id, 12);
        assert!(!book.bids.contains_key("0.002"));
    }

    #[test]
    fn zero_size_deletes_the_level() {
        let mut book = snapshot_book(10);

        apply_depth_event(&mut book, &event(11, &[("0.009", "0.00000000")], &[("0.010", "0.00000000")]));
        assert!(book.bids.is_empty());
        assert!(book.asks.is_empty());

        // Any other numeric value writes the level, including a plain "0".
        apply_depth_event(&mut book, &event(12, &[("0.009", "0")], &[]));
        assert_eq!(book.bids.get("0.009").map(String::as_str), Some("0"));
    }

    #[test]
    fn levels_overwrite_in_arrival_order() {
        let mut book = snapshot_book(0);

        apply_depth_event(&mut book, &event(1, &[("0.009", "5")], &[]));
        apply_depth_event(&mut book, &event(2, &[("0.009", "7")], &[]));

        assert_eq!(book.bids.get("0.009").map(String::as_str), Some("7"));
    }
}
