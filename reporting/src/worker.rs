//! Scheduler-driven worker that drains the pending-beacon queue.
//!
//! One invocation fetches a bounded batch, dispatches every send
//! concurrently, waits for all of them to settle within a single wall-clock
//! deadline, then unconditionally deletes the batch. A run that hits the
//! deadline (or is stopped by the scheduler) deletes nothing, so the whole
//! batch is retried wholesale by a later invocation; a run that settles
//! deletes everything it fetched no matter how many sends failed. Per
//! record that makes delivery at-most-once, with at-least-once retry only
//! at batch granularity.

use crate::config::BatchConfig;
use crate::metrics_defs::{
    RUN_COMPLETED, RUN_SETTLE_SECONDS, RUN_TIMEOUT, SEND_FAILURE, SEND_SUCCESS,
};
use crate::store::{PendingBeaconStore, StoreError};
use crate::transport::BeaconTransport;
use crate::types::epoch_millis;
use shared::{counter, histogram};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;

#[derive(thiserror::Error, Debug)]
pub enum WorkerError {
    #[error("delivery run exceeded its {0:?} deadline")]
    DeadlineExceeded(Duration),
    #[error("delivery run was stopped")]
    Stopped,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Outcome of one settled delivery pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryRunReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct BeaconSenderWorker {
    store: Arc<dyn PendingBeaconStore>,
    transport: Arc<dyn BeaconTransport>,
    batch_size: usize,
    max_runtime: Duration,
    stop_tx: watch::Sender<bool>,
}

impl BeaconSenderWorker {
    pub fn new(
        store: Arc<dyn PendingBeaconStore>,
        transport: Arc<dyn BeaconTransport>,
        config: &BatchConfig,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        BeaconSenderWorker {
            store,
            transport,
            batch_size: config.batch_size,
            max_runtime: config.max_runtime(),
            stop_tx,
        }
    }

    /// Abandon the in-flight run without deleting anything; the queue is
    /// left intact for the next scheduled invocation. Invoked by the
    /// scheduler's stop callback. A no-op when no run is in flight.
    pub fn stop_work(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// One full delivery pass. The caller (the scheduler trigger) is
    /// responsible for not running two passes concurrently.
    pub async fn run_once(&self) -> Result<DeliveryRunReport, WorkerError> {
        self.stop_tx.send_replace(false);
        let mut stop_rx = self.stop_tx.subscribe();

        let snapshot_ms = epoch_millis();
        let batch = self.store.get_pending(snapshot_ms, self.batch_size).await?;
        if batch.is_empty() {
            tracing::debug!("no pending debug beacons");
            return Ok(DeliveryRunReport::default());
        }

        let attempted = batch.len();
        let mut in_flight = JoinSet::new();
        for record in batch {
            let transport = Arc::clone(&self.transport);
            in_flight.spawn(async move {
                match transport.fetch_and_discard(&record.uri).await {
                    Ok(()) => {
                        counter!(SEND_SUCCESS).increment(1);
                        true
                    }
                    Err(err) => {
                        counter!(SEND_FAILURE).increment(1);
                        tracing::debug!(uri = %record.uri, error = %err, "pending beacon send failed");
                        false
                    }
                }
            });
        }

        let mut delivered = 0usize;
        let mut failed = 0usize;
        let settle_started = std::time::Instant::now();
        let deadline = sleep(self.max_runtime);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    counter!(RUN_TIMEOUT).increment(1);
                    tracing::warn!(
                        attempted,
                        settled = delivered + failed,
                        "delivery run hit its deadline, batch left queued"
                    );
                    return Err(WorkerError::DeadlineExceeded(self.max_runtime));
                }
                changed = stop_rx.changed() => {
                    if changed.is_ok() && *stop_rx.borrow_and_update() {
                        tracing::info!(attempted, "delivery run stopped, batch left queued");
                        return Err(WorkerError::Stopped);
                    }
                }
                joined = in_flight.join_next() => match joined {
                    Some(Ok(true)) => delivered += 1,
                    Some(Ok(false)) => failed += 1,
                    Some(Err(err)) => {
                        tracing::error!("beacon send task panicked: {err}");
                        failed += 1;
                    }
                    None => break,
                }
            }
        }

        histogram!(RUN_SETTLE_SECONDS).record(settle_started.elapsed().as_secs_f64());

        // Everything at or before the fetch snapshot is dropped, delivered or
        // not. Records enqueued while this run was in flight stay put.
        self.store.delete_before(snapshot_ms).await?;
        counter!(RUN_COMPLETED).increment(1);

        Ok(DeliveryRunReport {
            attempted,
            delivered,
            failed,
        })
    }
}
