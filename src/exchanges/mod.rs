// =============================================================================
// Exchange adapters — shared contract and subscription lifecycle
// =============================================================================
//
// Every adapter drives a fixed symbol set through long-lived background
// tasks. `start` spawns them, `reload` re-fetches candle history without
// touching live streams, and the subscription set lets shutdown signal every
// task and wait for an acknowledgment.
// =============================================================================

pub mod binance;
pub mod bittrex;
pub mod poloniex;

use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tracing::{debug, warn};

/// Longest we wait for any one subscription to acknowledge its stop signal.
const STOP_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Contract shared by the three exchange workers. Object-safe so the read
/// API can hold the workers behind `Arc<dyn Adapter>` for `/reload`.
pub trait Adapter: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawn all streams and pollers for the adapter's symbol set.
    /// Non-blocking.
    fn start(&self);

    /// Re-fetch the initial candle window for every (symbol, interval)
    /// without tearing down live streams. Logs one line when triggered.
    fn reload(&self);
}

// ---------------------------------------------------------------------------
// Subscription registry
// ---------------------------------------------------------------------------

struct SubscriptionHandle {
    label: String,
    stop: watch::Sender<bool>,
    done: oneshot::Receiver<()>,
}

/// Stop/ack bookkeeping for one adapter's background tasks.
///
/// Each spawned task registers itself and receives a stop receiver plus a
/// done sender; `stop_all` flips every stop flag and then waits (bounded) for
/// each done ack so shutdown can't hang on a stream that never yields.
#[derive(Default)]
pub struct SubscriptionSet {
    inner: Mutex<Vec<SubscriptionHandle>>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscription; the task keeps the receiver and sends on
    /// the done channel when it has wound down.
    pub fn register(&self, label: impl Into<String>) -> (watch::Receiver<bool>, oneshot::Sender<()>) {
        let (stop_tx, stop_rx) = watch::channel(false);
        let (done_tx, done_rx) = oneshot::channel();

        self.inner.lock().push(SubscriptionHandle {
            label: label.into(),
            stop: stop_tx,
            done: done_rx,
        });

        (stop_rx, done_tx)
    }

    /// Signal every registered subscription and await each acknowledgment,
    /// logging any that fail to ack within [`STOP_ACK_TIMEOUT`].
    pub async fn stop_all(&self) {
        let handles: Vec<SubscriptionHandle> = self.inner.lock().drain(..).collect();

        for handle in &handles {
            let _ = handle.stop.send(true);
        }

        for handle in handles {
            match tokio::time::timeout(STOP_ACK_TIMEOUT, handle.done).await {
                Ok(Ok(())) => debug!(subscription = %handle.label, "stopped"),
                // The task dropped its done sender without sending; it is
                // gone either way.
                Ok(Err(_)) => debug!(subscription = %handle.label, "already gone"),
                Err(_) => warn!(
                    subscription = %handle.label,
                    timeout_s = STOP_ACK_TIMEOUT.as_secs(),
                    "no stop acknowledgment within timeout"
                ),
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Sleep for `interval` unless the stop flag flips first. Returns `true` when
/// the caller should terminate.
pub async fn sleep_or_stop(interval: Duration, stop: &mut watch::Receiver<bool>) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        _ = tokio::time::sleep(interval) => false,
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
    }
}

// =============================================================================
// Tests
// =============================================================================
