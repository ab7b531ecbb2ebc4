//! Telemetry Engine
//!
//! Explicitly initialised owner of the setpoint registry, the windowed store,
//! the snapshot cache and the clock. One instance per process (or per grow
//! room); there are no module-level singletons.
//!
//! ## Data flow
//!
//! ```text
//! Reading → store.append (ordered insert + evict) → cache.invalidate_for(type, windows)
//!                                                 → broadcast SampleChange
//! snapshot(tf, types) → cache.get_or_compute → drift / deviation / stability → efficiency
//! ```

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::analytics;
use crate::cache::SnapshotCache;
use crate::clock::{Clock, SystemClock};
use crate::config::{defaults, ConfigError, EngineConfig};
use crate::setpoints::SetpointRegistry;
use crate::store::{AppendOutcome, StoreStats, WindowedSampleStore};
use crate::types::{
    DeviationStats, EfficiencyProfile, IngestError, Reading, ReadingEvent, SensorType, Snapshot,
    SnapshotKey, StabilityStats, StatsBundle, Timeframe,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    InvalidConfig(#[from] ConfigError),

    #[error("Timeframe {0} is not enabled in [windows]")]
    TimeframeDisabled(Timeframe),
}

/// What changed in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ChangeKind {
    /// A reading was stored
    Appended { late: bool },
    /// Readings past retention were dropped
    Evicted { count: usize },
}

/// Notification sent to subscribers for every accepted reading and eviction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleChange {
    pub sensor_type: SensorType,
    /// Windows whose content changed (empty for evictions)
    pub timeframes: Vec<Timeframe>,
    pub change: ChangeKind,
}

pub struct TelemetryEngine {
    config: EngineConfig,
    registry: SetpointRegistry,
    store: WindowedSampleStore,
    cache: SnapshotCache,
    clock: Arc<dyn Clock>,
    changes: broadcast::Sender<SampleChange>,
}

impl std::fmt::Debug for TelemetryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryEngine")
            .field("site", &self.config.site.name)
            .field("registry", &self.registry)
            .field("store", &self.store)
            .field("cached_snapshots", &self.cache.len())
            .finish()
    }
}

impl TelemetryEngine {
    /// Build an engine on the wall clock. Fails fast on an invalid config.
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Build an engine reading time from `clock` (replays, tests).
    pub fn with_clock(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        config.validate()?;
        let registry = SetpointRegistry::from_table(&config.setpoints).map_err(|errors| {
            ConfigError::Validation(errors.iter().map(ToString::to_string).collect())
        })?;

        let sensor_types = registry.sensor_types();
        let store = WindowedSampleStore::new(&sensor_types, &config.windows.enabled);
        let (changes, _) = broadcast::channel(defaults::CHANGE_CHANNEL_CAPACITY);

        info!(
            site = %config.site.name,
            scored = ?sensor_types,
            windows = ?store.timeframes(),
            retention = %config.retention(),
            "Telemetry engine initialised"
        );

        Ok(Self {
            config,
            registry,
            store,
            cache: SnapshotCache::new(),
            clock,
            changes,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SetpointRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Enabled timeframes in ascending order.
    pub fn timeframes(&self) -> &[Timeframe] {
        self.store.timeframes()
    }

    /// Receive a [`SampleChange`] for every accepted reading and eviction.
    pub fn subscribe(&self) -> broadcast::Receiver<SampleChange> {
        self.changes.subscribe()
    }

    fn notify(&self, change: SampleChange) {
        // No receivers is the normal case outside the CLI
        let _ = self.changes.send(change);
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// Store a validated reading and invalidate the snapshots it affects.
    ///
    /// A late reading only invalidates the windows that actually contain it;
    /// snapshots of shorter windows are left alone until their next natural
    /// invalidation.
    pub fn ingest(&self, reading: Reading) -> AppendOutcome {
        let sensor_type = reading.sensor_type;
        let timestamp = reading.timestamp;
        let outcome = self.store.append(reading, self.clock.now());

        match &outcome {
            AppendOutcome::Inserted { affected, late } => {
                let dropped = self.cache.invalidate_for(sensor_type, affected);
                if *late {
                    debug!(sensor = %sensor_type, timestamp = %timestamp, windows = ?affected, "Late reading inserted");
                }
                debug!(sensor = %sensor_type, invalidated = dropped, "Reading stored");
                self.notify(SampleChange {
                    sensor_type,
                    timeframes: affected.clone(),
                    change: ChangeKind::Appended { late: *late },
                });
            }
            AppendOutcome::Duplicate => {
                debug!(sensor = %sensor_type, timestamp = %timestamp, "Duplicate delivery ignored");
            }
            AppendOutcome::Expired => {
                warn!(sensor = %sensor_type, timestamp = %timestamp, "Reading older than retention dropped");
            }
            AppendOutcome::Untracked => {
                debug!(sensor = %sensor_type, "No setpoint for sensor type, reading not stored");
            }
            AppendOutcome::Rejected => {}
        }
        outcome
    }

    /// Validate a raw event at the boundary, then ingest it.
    pub fn ingest_event(&self, event: ReadingEvent) -> Result<AppendOutcome, IngestError> {
        let reading = event.into_reading().map_err(|e| {
            warn!(error = %e, "Rejected reading event");
            e
        })?;
        Ok(self.ingest(reading))
    }

    /// Drop readings past retention. Returns removed counts per sensor type.
    ///
    /// Evicted readings already lie outside every enabled window, so cached
    /// snapshots stay valid; window rollover is handled by snapshot expiry.
    pub fn evict_expired(&self) -> BTreeMap<SensorType, usize> {
        let removed = self.store.evict_expired(self.clock.now());
        for (sensor_type, count) in &removed {
            self.notify(SampleChange {
                sensor_type: *sensor_type,
                timeframes: Vec::new(),
                change: ChangeKind::Evicted { count: *count },
            });
        }
        removed
    }

    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Stats bundle for `timeframe` over `sensor_types`, served from the cache
    /// when a valid snapshot exists.
    pub async fn snapshot(
        &self,
        timeframe: Timeframe,
        sensor_types: &[SensorType],
    ) -> Result<Arc<Snapshot>, EngineError> {
        if !self.store.timeframes().contains(&timeframe) {
            return Err(EngineError::TimeframeDisabled(timeframe));
        }
        let key = SnapshotKey::new(timeframe, sensor_types);
        let now = self.clock.now();
        Ok(self
            .cache
            .get_or_compute(&key, now, || async { self.compute_snapshot(&key, now) })
            .await)
    }

    /// Snapshot over every scored sensor type.
    pub async fn snapshot_all(&self, timeframe: Timeframe) -> Result<Arc<Snapshot>, EngineError> {
        self.snapshot(timeframe, &self.registry.sensor_types()).await
    }

    pub async fn deviation_bundle(
        &self,
        timeframe: Timeframe,
    ) -> Result<BTreeMap<SensorType, DeviationStats>, EngineError> {
        Ok(self.snapshot_all(timeframe).await?.bundle.deviation.clone())
    }

    pub async fn stability_bundle(
        &self,
        timeframe: Timeframe,
    ) -> Result<BTreeMap<SensorType, StabilityStats>, EngineError> {
        Ok(self.snapshot_all(timeframe).await?.bundle.stability.clone())
    }

    pub async fn efficiency(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<EfficiencyProfile>, EngineError> {
        Ok(self.snapshot_all(timeframe).await?.bundle.efficiency.clone())
    }

    /// Compute a snapshot directly from the store, bypassing the cache.
    ///
    /// Pure with respect to the window contents: the same readings and `now`
    /// always produce an identical snapshot.
    pub fn compute_snapshot(&self, key: &SnapshotKey, now: DateTime<Utc>) -> Snapshot {
        let timeframe = key.timeframe;
        let deadband = self.config.drift.deadband_per_hour;

        let mut bundle = StatsBundle::default();
        let mut sample_counts = BTreeMap::new();
        let mut expires_at: Option<DateTime<Utc>> = None;

        for &sensor_type in key.sensor_types() {
            let samples = self.store.samples_for(sensor_type, timeframe, now);
            sample_counts.insert(sensor_type, samples.len());

            // First instant at which the oldest reading is outside the window
            if let Some(oldest) = samples.first() {
                let leaves = oldest.timestamp + timeframe.duration() + Duration::nanoseconds(1);
                expires_at = Some(expires_at.map_or(leaves, |t| t.min(leaves)));
            }

            let Some(setpoint) = self.registry.get(sensor_type) else {
                continue;
            };
            if let Some(stats) = analytics::deviation_stats(&samples, setpoint, deadband) {
                bundle.deviation.insert(sensor_type, stats);
            }
            if let Some(stats) =
                analytics::stability_stats(&samples, setpoint, &self.config.stability)
            {
                bundle.stability.insert(sensor_type, stats);
            }
        }

        bundle.efficiency = analytics::efficiency_profile(
            &bundle.deviation,
            &bundle.stability,
            &self.config.efficiency,
        );

        debug!(
            key = %key,
            scored = bundle.deviation.len(),
            samples = sample_counts.values().sum::<usize>(),
            "Snapshot computed"
        );

        Snapshot {
            key: key.clone(),
            bundle,
            sample_counts,
            computed_at: now,
            expires_at,
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    /// Run periodic eviction until `cancel` fires, bounding memory even when
    /// no new readings arrive.
    pub fn spawn_maintenance(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let period = std::time::Duration::from_secs(engine.config.maintenance.eviction_interval_secs);

        tokio::spawn(async move {
            info!(interval_secs = period.as_secs(), "Maintenance task starting");
            let mut interval = tokio::time::interval(period);
            let mut passes = 0u64;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(passes, "Maintenance task received shutdown signal");
                        return;
                    }
                    _ = interval.tick() => {
                        let removed = engine.evict_expired();
                        passes += 1;
                        if !removed.is_empty() {
                            debug!(types = removed.len(), "Maintenance eviction pass");
                        }
                    }
                }
            }
        })
    }
}
