//! Liveness reporting.
//!
//! A started consumer writes `consumer:<id>:heartbeat` with the current
//! epoch millis every keepalive/10, expiring after twice the keepalive.
//! An absent key means the consumer is dead to anyone watching.

use std::sync::Arc;
use std::time::Duration;

use opentelemetry::KeyValue;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::with_cancel;
use crate::error::Result;
use crate::store::StreamStore;
use crate::telemetry::metrics;

/// Key under which a consumer's liveness is recorded.
pub fn heartbeat_key(consumer_id: &str) -> String {
    format!("consumer:{consumer_id}:heartbeat")
}

/// Write one heartbeat for `consumer_id`.
pub(crate) async fn beat<S: StreamStore + ?Sized>(
    store: &S,
    consumer_id: &str,
    expiry: Duration,
    cancel: &CancellationToken,
) -> Result<()> {
    let now = chrono::Utc::now().timestamp_millis();
    with_cancel(
        cancel,
        store.set_with_expiry(&heartbeat_key(consumer_id), now.to_string(), expiry),
    )
    .await
}

/// Handle to a running heartbeat loop.
///
/// Owns the loop's cancellation token and its join handle; stopping
/// cancels the token and waits for the loop to exit.
#[derive(Debug)]
pub struct HeartbeatTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HeartbeatTask {
    /// Spawn the loop on the current runtime, bound to a child of `parent`.
    pub fn spawn<S: StreamStore>(
        store: Arc<S>,
        consumer_id: String,
        interval: Duration,
        expiry: Duration,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let handle = tokio::spawn(run(store, consumer_id, interval, expiry, cancel.clone()));
        Self { cancel, handle }
    }

    /// Request the loop to stop without waiting for it.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancel the loop and wait until it has exited.
    pub async fn stop_and_wait(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!(error = %e, "heartbeat task did not exit cleanly");
        }
    }
}

async fn run<S: StreamStore>(
    store: Arc<S>,
    consumer_id: String,
    interval: Duration,
    expiry: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(
        consumer = %consumer_id,
        interval_ms = interval.as_millis() as u64,
        expiry_ms = expiry.as_millis() as u64,
        "heartbeat started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        // A failed write is retried by the next tick.
        match beat(store.as_ref(), &consumer_id, expiry, &cancel).await {
            Ok(()) => metrics::heartbeats().add(1, &[KeyValue::new("result", "ok")]),
            Err(e) => {
                metrics::heartbeats().add(1, &[KeyValue::new("result", "error")]);
                if cancel.is_cancelled() {
                    error!(consumer = %consumer_id, error = %e, "updating heartbeat");
                } else {
                    info!(consumer = %consumer_id, error = %e, "updating heartbeat");
                }
            }
        }
    }

    debug!(consumer = %consumer_id, "heartbeat stopped");
}
