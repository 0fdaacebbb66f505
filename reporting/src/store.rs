//! Narrow DAO over the pending-beacon queue.
//!
//! The relational engine behind a production deployment lives outside this
//! crate; implementations only have to honor the snapshot semantics the
//! worker relies on (fetch and delete are both bounded by a caller-supplied
//! timestamp).

use crate::types::{NewPendingBeacon, PendingBeacon};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait PendingBeaconStore: Send + Sync {
    /// Persist a batch of resolved beacons in one write.
    async fn insert_all(&self, beacons: Vec<NewPendingBeacon>) -> Result<(), StoreError>;

    /// Up to `limit` records enqueued at or before `before_ms`, oldest first.
    async fn get_pending(
        &self,
        before_ms: u64,
        limit: usize,
    ) -> Result<Vec<PendingBeacon>, StoreError>;

    /// Bulk-delete every record enqueued at or before `at_ms`. Returns the
    /// number of rows removed.
    async fn delete_before(&self, at_ms: u64) -> Result<u64, StoreError>;
}

/// Queue implementation for embedded deployments and tests.
pub struct InMemoryBeaconStore {
    rows: Mutex<Vec<PendingBeacon>>,
    next_id: AtomicU64,
}

impl InMemoryBeaconStore {
    pub fn new() -> Self {
        InMemoryBeaconStore {
            rows: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }
}

impl Default for InMemoryBeaconStore {
    fn default() -> Self {
        InMemoryBeaconStore::new()
    }
}

#[async_trait]
impl PendingBeaconStore for InMemoryBeaconStore {
    async fn insert_all(&self, beacons: Vec<NewPendingBeacon>) -> Result<(), StoreError> {
        let mut rows = self.rows.lock();
        for beacon in beacons {
            rows.push(PendingBeacon {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                uri: beacon.uri,
                is_win: beacon.is_win,
                enqueued_at_ms: beacon.enqueued_at_ms,
            });
        }
        Ok(())
    }

    async fn get_pending(
        &self,
        before_ms: u64,
        limit: usize,
    ) -> Result<Vec<PendingBeacon>, StoreError> {
        let rows = self.rows.lock();
        let mut pending: Vec<PendingBeacon> = rows
            .iter()
            .filter(|row| row.enqueued_at_ms <= before_ms)
            .cloned()
            .collect();
        pending.sort_by_key(|row| (row.enqueued_at_ms, row.id));
        pending.truncate(limit);
        Ok(pending)
    }

    async fn delete_before(&self, at_ms: u64) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock();
        let before = rows.len();
        rows.retain(|row| row.enqueued_at_ms > at_ms);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use url::Url;

    fn beacon(path: &str, enqueued_at_ms: u64) -> NewPendingBeacon {
        NewPendingBeacon {
            uri: Url::parse(&format!("https://example.com/{path}")).unwrap(),
            is_win: false,
            enqueued_at_ms,
        }
    }

    #[tokio::test]
    async fn get_pending_returns_oldest_first_up_to_limit() {
        let store = InMemoryBeaconStore::new();
        store
            .insert_all(vec![beacon("c", 30), beacon("a", 10), beacon("b", 20)])
            .await
            .unwrap();

        let pending = store.get_pending(100, 2).await.unwrap();

        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].uri.path(), "/a");
        assert_eq!(pending[1].uri.path(), "/b");
    }

    #[tokio::test]
    async fn get_pending_excludes_records_after_the_snapshot() {
        let store = InMemoryBeaconStore::new();
        store
            .insert_all(vec![beacon("old", 10), beacon("new", 50)])
            .await
            .unwrap();

        let pending = store.get_pending(10, 10).await.unwrap();

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].uri.path(), "/old");
    }

    #[tokio::test]
    async fn delete_before_is_bounded_by_the_snapshot() {
        let store = InMemoryBeaconStore::new();
        store
            .insert_all(vec![beacon("a", 10), beacon("b", 20), beacon("c", 21)])
            .await
            .unwrap();

        let removed = store.delete_before(20).await.unwrap();

        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        let survivors = store.get_pending(u64::MAX, 10).await.unwrap();
        assert_eq!(survivors[0].uri.path(), "/c");
    }

    #[tokio::test]
    async fn ids_are_assigned_in_insertion_order() {
        let store = InMemoryBeaconStore::new();
        store
            .insert_all(vec![beacon("a", 10), beacon("b", 10)])
            .await
            .unwrap();

        let pending = store.get_pending(10, 10).await.unwrap();

        assert!(pending[0].id < pending[1].id);
        assert_eq!(pending[0].uri.path(), "/a");
    }
}
