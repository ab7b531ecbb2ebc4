//! Snapshot Cache
//!
//! Memoizes whole stats bundles per `(timeframe, sorted sensor-type set)`.
//! Each key maps to a shared `OnceCell` acting as the compute token: the first
//! caller runs the computation, concurrent callers for the same key await the
//! same in-flight result instead of starting a duplicate.
//!
//! Entries are never patched. Invalidation drops the cell; the next `get`
//! installs a fresh one and recomputes the whole bundle.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::types::{SensorType, Snapshot, SnapshotKey, Timeframe};

type Slot = Arc<OnceCell<Arc<Snapshot>>>;

#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: Mutex<HashMap<SnapshotKey, Slot>>,
    hits: AtomicU64,
    computes: AtomicU64,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SnapshotKey, Slot>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the cached snapshot for `key`, computing it on first access or
    /// after window rollover has expired the previous one.
    pub async fn get_or_compute<F, Fut>(
        &self,
        key: &SnapshotKey,
        now: DateTime<Utc>,
        compute: F,
    ) -> Arc<Snapshot>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Snapshot>,
    {
        let slot = {
            let mut entries = self.lock();
            let stale = entries
                .get(key)
                .and_then(|slot| slot.get())
                .is_some_and(|snapshot| snapshot.is_expired(now));
            if stale {
                debug!(key = %key, "Snapshot expired by window rollover");
                entries.remove(key);
            }
            Arc::clone(entries.entry(key.clone()).or_default())
        };

        if let Some(snapshot) = slot.get() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(snapshot);
        }

        let snapshot = slot
            .get_or_init(|| async {
                self.computes.fetch_add(1, Ordering::Relaxed);
                debug!(key = %key, "Computing snapshot");
                Arc::new(compute().await)
            })
            .await;
        Arc::clone(snapshot)
    }

    /// Last published snapshot for `key`, without computing.
    pub fn peek(&self, key: &SnapshotKey) -> Option<Arc<Snapshot>> {
        self.lock().get(key).and_then(|slot| slot.get().cloned())
    }

    /// Drop every entry whose key includes `sensor_type`.
    pub fn invalidate(&self, sensor_type: SensorType) -> usize {
        self.invalidate_where(|key| key.includes(sensor_type))
    }

    /// Drop entries for `sensor_type` restricted to the given timeframes.
    pub fn invalidate_for(&self, sensor_type: SensorType, timeframes: &[Timeframe]) -> usize {
        self.invalidate_where(|key| key.includes(sensor_type) && timeframes.contains(&key.timeframe))
    }

    fn invalidate_where(&self, pred: impl Fn(&SnapshotKey) -> bool) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|key, _| !pred(key));
        before - entries.len()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Requests served from an already published snapshot.
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// Bundle computations run so far.
    pub fn computes(&self) -> u64 {
        self.computes.load(Ordering::Relaxed)
    }
}
