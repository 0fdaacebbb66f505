//! Flag-gated delivery of resolved beacons.
//!
//! The sender is built once from configuration and callers see a single
//! enqueue/flush surface regardless of the selected strategy. Delivery is
//! always best-effort: only `flush()` can fail, and only for persistence or
//! scheduling problems, never for an individual send.

use crate::config::{DeliveryMode, ReportingConfig};
use crate::metrics_defs::{QUEUE_INSERTED, SEND_FAILURE, SEND_SUCCESS};
use crate::scheduler::{DeliveryScheduler, SchedulerError};
use crate::store::{PendingBeaconStore, StoreError};
use crate::transport::BeaconTransport;
use crate::types::{NewPendingBeacon, ResolvedBeacon, epoch_millis};
use shared::counter;
use std::sync::Arc;
use tokio::task::JoinSet;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("beacon must be an absolute https URI: {0}")]
    InvalidBeacon(Url),
    #[error("failed to persist pending beacons: {0}")]
    Store(#[from] StoreError),
    #[error("failed to arm the delivery job: {0}")]
    Scheduler(#[from] SchedulerError),
}

/// Debug-report sender facade over a closed set of strategies.
pub struct BeaconSender(SenderInner);

enum SenderInner {
    Disabled,
    Immediate(ImmediateSender),
    Batch(BatchSender),
}

impl BeaconSender {
    /// Build the strategy selected by configuration. The choice is made
    /// here, once, and never re-evaluated per call.
    pub fn from_config(
        config: &ReportingConfig,
        transport: Arc<dyn BeaconTransport>,
        store: Arc<dyn PendingBeaconStore>,
        scheduler: Arc<dyn DeliveryScheduler>,
    ) -> Self {
        match config.mode {
            DeliveryMode::Disabled => BeaconSender::disabled(),
            DeliveryMode::Immediate => BeaconSender::immediate(transport),
            DeliveryMode::Batch => BeaconSender::batched(store, scheduler),
        }
    }

    /// Sender that drops everything. Used when debug reporting is off.
    pub fn disabled() -> Self {
        BeaconSender(SenderInner::Disabled)
    }

    /// Sender that issues each GET as soon as the beacon is enqueued.
    pub fn immediate(transport: Arc<dyn BeaconTransport>) -> Self {
        BeaconSender(SenderInner::Immediate(ImmediateSender {
            transport,
            in_flight: tokio::sync::Mutex::new(JoinSet::new()),
        }))
    }

    /// Sender that buffers beacons and hands them to the persistent queue
    /// on flush, arming the periodic delivery job.
    pub fn batched(
        store: Arc<dyn PendingBeaconStore>,
        scheduler: Arc<dyn DeliveryScheduler>,
    ) -> Self {
        BeaconSender(SenderInner::Batch(BatchSender {
            store,
            scheduler,
            buffer: parking_lot::Mutex::new(Vec::new()),
        }))
    }

    pub async fn enqueue(&self, beacon: ResolvedBeacon) -> Result<(), DeliveryError> {
        check_beacon(&beacon)?;
        match &self.0 {
            SenderInner::Disabled => {}
            SenderInner::Immediate(sender) => sender.enqueue(beacon).await,
            SenderInner::Batch(sender) => sender.enqueue(beacon),
        }
        Ok(())
    }

    pub async fn batch_enqueue(&self, beacons: Vec<ResolvedBeacon>) -> Result<(), DeliveryError> {
        for beacon in &beacons {
            check_beacon(beacon)?;
        }
        match &self.0 {
            SenderInner::Disabled => {}
            SenderInner::Immediate(sender) => {
                for beacon in beacons {
                    sender.enqueue(beacon).await;
                }
            }
            SenderInner::Batch(sender) => {
                let mut buffer = sender.buffer.lock();
                buffer.extend(beacons);
            }
        }
        Ok(())
    }

    /// Settle the strategy: await every outstanding send (immediate), or
    /// persist the buffered beacons and arm the delivery job (batch).
    /// Individual send failures never surface here.
    pub async fn flush(&self) -> Result<(), DeliveryError> {
        match &self.0 {
            SenderInner::Disabled => Ok(()),
            SenderInner::Immediate(sender) => {
                sender.flush().await;
                Ok(())
            }
            SenderInner::Batch(sender) => sender.flush().await,
        }
    }
}

/// Beacons reaching the sender must already be absolute https URIs;
/// anything else is rejected before it reaches a strategy.
fn check_beacon(beacon: &ResolvedBeacon) -> Result<(), DeliveryError> {
    if beacon.uri.scheme() != "https" {
        return Err(DeliveryError::InvalidBeacon(beacon.uri.clone()));
    }
    Ok(())
}

struct ImmediateSender {
    transport: Arc<dyn BeaconTransport>,
    in_flight: tokio::sync::Mutex<JoinSet<()>>,
}

impl ImmediateSender {
    async fn enqueue(&self, beacon: ResolvedBeacon) {
        let transport = Arc::clone(&self.transport);
        self.in_flight.lock().await.spawn(async move {
            match transport.fetch_and_discard(&beacon.uri).await {
                Ok(()) => counter!(SEND_SUCCESS).increment(1),
                Err(err) => {
                    counter!(SEND_FAILURE).increment(1);
                    tracing::debug!(uri = %beacon.uri, error = %err, "debug beacon send failed");
                }
            }
        });
    }

    async fn flush(&self) {
        let mut in_flight = self.in_flight.lock().await;
        // Each task already recorded its own outcome; settling is all that
        // is awaited here.
        while let Some(joined) = in_flight.join_next().await {
            if let Err(err) = joined {
                tracing::error!("beacon send task panicked: {err}");
            }
        }
    }
}

struct BatchSender {
    store: Arc<dyn PendingBeaconStore>,
    scheduler: Arc<dyn DeliveryScheduler>,
    buffer: parking_lot::Mutex<Vec<ResolvedBeacon>>,
}

impl BatchSender {
    fn enqueue(&self, beacon: ResolvedBeacon) {
        self.buffer.lock().push(beacon);
    }

    async fn flush(&self) -> Result<(), DeliveryError> {
        let drained: Vec<ResolvedBeacon> = std::mem::take(&mut *self.buffer.lock());
        if drained.is_empty() {
            return Ok(());
        }

        // The buffer stays drained even if the write below fails; a failed
        // batch is dropped, not redelivered.
        let enqueued_at_ms = epoch_millis();
        let records: Vec<NewPendingBeacon> = drained
            .into_iter()
            .map(|beacon| NewPendingBeacon {
                uri: beacon.uri,
                is_win: beacon.side.is_win(),
                enqueued_at_ms,
            })
            .collect();
        let inserted = records.len();

        self.store.insert_all(records).await?;
        counter!(QUEUE_INSERTED).increment(inserted as u64);
        tracing::debug!(inserted, "queued debug beacons for batch delivery");

        self.scheduler.schedule_if_needed(false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::JobConfig;
    use crate::store::InMemoryBeaconStore;
    use crate::transport::TransportError;
    use crate::types::{PendingBeacon, ReportSide};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct RecordingTransport {
        calls: parking_lot::Mutex<Vec<Url>>,
        fail: bool,
    }

    impl RecordingTransport {
        fn new(fail: bool) -> Self {
            RecordingTransport {
                calls: parking_lot::Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl BeaconTransport for RecordingTransport {
        async fn fetch_and_discard(&self, uri: &Url) -> Result<(), TransportError> {
            self.calls.lock().push(uri.clone());
            // Yield so flush genuinely waits on in-flight sends.
            tokio::time::sleep(Duration::from_millis(1)).await;
            if self.fail {
                return Err(TransportError::Status(
                    reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                ));
            }
            Ok(())
        }
    }

    struct RecordingScheduler {
        triggers: AtomicUsize,
    }

    impl RecordingScheduler {
        fn new() -> Self {
            RecordingScheduler {
                triggers: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DeliveryScheduler for RecordingScheduler {
        async fn schedule_if_needed(&self, _force: bool) -> Result<(), SchedulerError> {
            self.triggers.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn schedule(&self, _config: JobConfig) -> Result<(), SchedulerError> {
            self.triggers.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        async fn cancel_all(&self) -> Result<(), SchedulerError> {
            Ok(())
        }
    }

    struct FailingStore;

    #[async_trait]
    impl PendingBeaconStore for FailingStore {
        async fn insert_all(&self, _beacons: Vec<NewPendingBeacon>) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk full".into()))
        }

        async fn get_pending(
            &self,
            _before_ms: u64,
            _limit: usize,
        ) -> Result<Vec<PendingBeacon>, StoreError> {
            Ok(Vec::new())
        }

        async fn delete_before(&self, _at_ms: u64) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn beacon(path: &str) -> ResolvedBeacon {
        ResolvedBeacon {
            uri: Url::parse(&format!("https://example.com{path}")).unwrap(),
            side: ReportSide::Loss,
        }
    }

    #[tokio::test]
    async fn disabled_sender_accepts_and_drops_everything() {
        let sender = BeaconSender::disabled();

        sender.enqueue(beacon("/a")).await.unwrap();
        sender
            .batch_enqueue(vec![beacon("/b"), beacon("/c")])
            .await
            .unwrap();
        sender.flush().await.unwrap();
    }

    #[tokio::test]
    async fn non_https_beacon_is_rejected_eagerly() {
        let sender = BeaconSender::disabled();
        let bad = ResolvedBeacon {
            uri: Url::parse("http://example.com/a").unwrap(),
            side: ReportSide::Win,
        };

        let err = sender.enqueue(bad).await.unwrap_err();

        assert!(matches!(err, DeliveryError::InvalidBeacon(_)));
    }

    #[tokio::test]
    async fn immediate_flush_settles_all_sends_despite_failures() {
        let transport = Arc::new(RecordingTransport::new(true));
        let sender = BeaconSender::immediate(transport.clone());

        sender.enqueue(beacon("/a")).await.unwrap();
        sender
            .batch_enqueue(vec![beacon("/b"), beacon("/c")])
            .await
            .unwrap();
        sender.flush().await.unwrap();

        assert_eq!(transport.calls.lock().len(), 3);
    }

    #[tokio::test]
    async fn batch_flush_with_empty_buffer_touches_nothing() {
        let store = Arc::new(InMemoryBeaconStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let sender = BeaconSender::batched(store.clone(), scheduler.clone());

        sender.flush().await.unwrap();

        assert!(store.is_empty());
        assert_eq!(scheduler.triggers.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn batch_flush_persists_once_and_arms_the_job() {
        let store = Arc::new(InMemoryBeaconStore::new());
        let scheduler = Arc::new(RecordingScheduler::new());
        let sender = BeaconSender::batched(store.clone(), scheduler.clone());

        sender
            .enqueue(ResolvedBeacon {
                uri: Url::parse("https://example.com/win").unwrap(),
                side: ReportSide::Win,
            })
            .await
            .unwrap();
        sender.enqueue(beacon("/loss")).await.unwrap();
        sender.flush().await.unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(scheduler.triggers.load(Ordering::Relaxed), 1);
        let rows = store.get_pending(u64::MAX, 10).await.unwrap();
        assert!(rows.iter().any(|row| row.is_win && row.uri.path() == "/win"));

        // A second flush finds the buffer empty again.
        sender.flush().await.unwrap();
        assert_eq!(scheduler.triggers.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn batch_flush_propagates_store_failures() {
        let scheduler = Arc::new(RecordingScheduler::new());
        let sender = BeaconSender::batched(Arc::new(FailingStore), scheduler.clone());

        sender.enqueue(beacon("/a")).await.unwrap();
        let err = sender.flush().await.unwrap_err();

        assert!(matches!(err, DeliveryError::Store(_)));
        // The job is never armed for a write that failed.
        assert_eq!(scheduler.triggers.load(Ordering::Relaxed), 0);
    }
}
