//! Windowed Sample Store
//!
//! Holds the raw readings for every scored sensor type in timestamp order.
//! Each sensor type owns an independent series behind its own lock, so
//! appends for different types proceed in parallel while appends for the
//! same type serialize. Eviction is time-based (drop-from-front) against the
//! largest enabled timeframe, which bounds memory regardless of ingest rate.
//!
//! Window lookups binary-search the window start and copy only the tail of
//! the series; no operation rescans history older than the window. In-order
//! appends are O(1) amortised; a late reading is placed by binary search and
//! costs a shift of the readings after it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use crate::types::{Reading, SensorType, Timeframe};

/// Result of a single append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppendOutcome {
    /// Stored. `affected` lists the enabled timeframes whose window now
    /// contains the reading; `late` is set when it landed before the newest
    /// reading already stored (out-of-order arrival).
    Inserted {
        affected: Vec<Timeframe>,
        late: bool,
    },
    /// Same sensor type, source and timestamp as a stored reading; ignored.
    Duplicate,
    /// Older than the retention window; dropped without being stored.
    Expired,
    /// The sensor type has no setpoint and is never scored.
    Untracked,
    /// Non-finite value slipped past the ingestion boundary.
    Rejected,
}

impl AppendOutcome {
    pub fn is_inserted(&self) -> bool {
        matches!(self, AppendOutcome::Inserted { .. })
    }
}

/// Occupancy of one sensor series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesStats {
    pub readings: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
}

/// Occupancy of the whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub series: BTreeMap<SensorType, SeriesStats>,
    pub total_readings: usize,
}

/// Ordered readings for one sensor type.
#[derive(Debug, Default)]
struct SensorSeries {
    readings: VecDeque<Reading>,
}

impl SensorSeries {
    /// Insert at the timestamp-ordered position. Returns `None` for a
    /// duplicate delivery, otherwise whether the insert was out of order.
    fn insert(&mut self, reading: Reading) -> Option<bool> {
        let pos = self
            .readings
            .partition_point(|r| r.timestamp <= reading.timestamp);

        // Readings with an equal timestamp sit immediately before `pos`
        let duplicate = self
            .readings
            .range(..pos)
            .rev()
            .take_while(|r| r.timestamp == reading.timestamp)
            .any(|r| r.is_same_delivery(&reading));
        if duplicate {
            return None;
        }

        let late = pos < self.readings.len();
        self.readings.insert(pos, reading);
        Some(late)
    }

    /// Drop readings with `timestamp < cutoff`. Returns how many were removed.
    fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let stale = self.readings.partition_point(|r| r.timestamp < cutoff);
        self.readings.drain(..stale);
        stale
    }

    fn window(&self, start: DateTime<Utc>) -> Vec<Reading> {
        let first = self.readings.partition_point(|r| r.timestamp < start);
        self.readings.range(first..).cloned().collect()
    }

    fn stats(&self) -> SeriesStats {
        SeriesStats {
            readings: self.readings.len(),
            oldest: self.readings.front().map(|r| r.timestamp),
            newest: self.readings.back().map(|r| r.timestamp),
        }
    }
}

/// Bounded, ordered reading store keyed by sensor type.
#[derive(Debug)]
pub struct WindowedSampleStore {
    series: BTreeMap<SensorType, RwLock<SensorSeries>>,
    timeframes: Vec<Timeframe>,
    retention: Duration,
}

impl WindowedSampleStore {
    /// Create a store tracking `sensor_types` for the given enabled timeframes.
    pub fn new(sensor_types: &[SensorType], timeframes: &[Timeframe]) -> Self {
        let mut timeframes = timeframes.to_vec();
        timeframes.sort_unstable();
        timeframes.dedup();
        let retention = timeframes
            .last()
            .map_or_else(|| Timeframe::Month.duration(), Timeframe::duration);

        Self {
            series: sensor_types
                .iter()
                .map(|t| (*t, RwLock::new(SensorSeries::default())))
                .collect(),
            timeframes,
            retention,
        }
    }

    /// Readings older than `now - retention` are evicted.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn timeframes(&self) -> &[Timeframe] {
        &self.timeframes
    }

    fn read_series(lock: &RwLock<SensorSeries>) -> RwLockReadGuard<'_, SensorSeries> {
        lock.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_series(lock: &RwLock<SensorSeries>) -> RwLockWriteGuard<'_, SensorSeries> {
        lock.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a reading at its timestamp-ordered position and evict stale
    /// readings of the same type.
    pub fn append(&self, reading: Reading, now: DateTime<Utc>) -> AppendOutcome {
        let Some(lock) = self.series.get(&reading.sensor_type) else {
            return AppendOutcome::Untracked;
        };
        if !reading.value.is_finite() {
            warn!(sensor = %reading.sensor_type, source = %reading.source_id, "Rejected non-finite reading");
            return AppendOutcome::Rejected;
        }

        let cutoff = now - self.retention;
        if reading.timestamp < cutoff {
            debug!(
                sensor = %reading.sensor_type,
                timestamp = %reading.timestamp,
                "Reading older than retention, dropped"
            );
            return AppendOutcome::Expired;
        }

        let affected: Vec<Timeframe> = self
            .timeframes
            .iter()
            .copied()
            .filter(|tf| reading.timestamp >= tf.window_start(now))
            .collect();
        let sensor_type = reading.sensor_type;

        let mut series = Self::write_series(lock);
        let Some(late) = series.insert(reading) else {
            debug!(sensor = %sensor_type, "Duplicate reading ignored");
            return AppendOutcome::Duplicate;
        };
        let evicted = series.evict_before(cutoff);
        drop(series);

        if evicted > 0 {
            debug!(sensor = %sensor_type, evicted, "Evicted stale readings on append");
        }
        AppendOutcome::Inserted { affected, late }
    }

    /// Remove every reading older than `cutoff`. Returns the removed count per
    /// sensor type (types with nothing removed are omitted).
    pub fn evict_before(&self, cutoff: DateTime<Utc>) -> BTreeMap<SensorType, usize> {
        let mut removed = BTreeMap::new();
        for (sensor_type, lock) in &self.series {
            let n = Self::write_series(lock).evict_before(cutoff);
            if n > 0 {
                removed.insert(*sensor_type, n);
            }
        }
        if !removed.is_empty() {
            info!(cutoff = %cutoff, types = removed.len(), "Evicted readings past retention");
        }
        removed
    }

    /// Evict against the retention window ending at `now`.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> BTreeMap<SensorType, usize> {
        self.evict_before(now - self.retention)
    }

    /// Ordered readings with `timestamp >= now - timeframe`. An empty result
    /// means "no data yet".
    pub fn samples_for(
        &self,
        sensor_type: SensorType,
        timeframe: Timeframe,
        now: DateTime<Utc>,
    ) -> Vec<Reading> {
        self.series.get(&sensor_type).map_or_else(Vec::new, |lock| {
            Self::read_series(lock).window(timeframe.window_start(now))
        })
    }

    pub fn len(&self, sensor_type: SensorType) -> usize {
        self.series
            .get(&sensor_type)
            .map_or(0, |lock| Self::read_series(lock).readings.len())
    }

    pub fn stats(&self) -> StoreStats {
        let series: BTreeMap<SensorType, SeriesStats> = self
            .series
            .iter()
            .map(|(t, lock)| (*t, Self::read_series(lock).stats()))
            .collect();
        let total_readings = series.values().map(|s| s.readings).sum();
        StoreStats {
            series,
            total_readings,
        }
    }
}
