//! Engine Scenario Tests
//!
//! End-to-end behaviour of `TelemetryEngine` driven by a manual clock:
//! windowing, eviction, idempotent recompute, cache concurrency and the
//! efficiency view over realistic greenhouse episodes.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use myco_telemetry::{
    AppendOutcome, DriftStatus, EngineConfig, ManualClock, Reading, ReadingEvent, SensorType,
    SubsystemStatus, TelemetryEngine, Timeframe,
};

// ============================================================================
// Helpers
// ============================================================================

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 14, 6, 0, 0).unwrap()
}

fn engine_at(now: DateTime<Utc>) -> (Arc<TelemetryEngine>, Arc<ManualClock>) {
    engine_with(EngineConfig::default(), now)
}

fn engine_with(config: EngineConfig, now: DateTime<Utc>) -> (Arc<TelemetryEngine>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now));
    let engine = TelemetryEngine::with_clock(config, clock.clone()).expect("valid config");
    (Arc::new(engine), clock)
}

fn reading(sensor_type: SensorType, minutes: i64, value: f64) -> Reading {
    Reading::new(sensor_type, value, t0() + Duration::minutes(minutes), "room-1").unwrap()
}

fn ingest_hourly(engine: &TelemetryEngine, sensor_type: SensorType, values: &[f64]) {
    for (i, v) in values.iter().enumerate() {
        let outcome = engine.ingest(reading(sensor_type, i as i64 * 60, *v));
        assert!(outcome.is_inserted(), "{outcome:?}");
    }
}

// ============================================================================
// Reference Scenario
// ============================================================================

#[tokio::test]
async fn temperature_excursion_scenario() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(3));
    ingest_hourly(&engine, SensorType::Temperature, &[22.0, 23.0, 30.0, 23.0]);

    let snapshot = engine.snapshot(Timeframe::Day, &[SensorType::Temperature]).await.unwrap();
    let dev = &snapshot.bundle.deviation[&SensorType::Temperature];
    assert_eq!(dev.spike_count, 1);
    assert_eq!(dev.avg_dev, 2.0);
    assert_eq!(dev.max_delta, 7.0);
    assert_eq!(dev.drift, 1.0);
    assert_eq!(dev.drift_status, DriftStatus::Rising);

    let stab = &snapshot.bundle.stability[&SensorType::Temperature];
    assert_eq!(stab.stable_percent + stab.unstable_percent, 100);
    // The single reading above the band forms a zero-length run
    assert_eq!(stab.max_unstable, 0.0);
    assert!((0.0..=100.0).contains(&stab.score));
}

#[tokio::test]
async fn constant_stream_on_ideal() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(12));
    ingest_hourly(&engine, SensorType::Humidity, &[88.0; 12]);

    let snapshot = engine.snapshot_all(Timeframe::Day).await.unwrap();
    let dev = &snapshot.bundle.deviation[&SensorType::Humidity];
    assert_eq!(dev.drift, 0.0);
    assert_eq!(dev.drift_status, DriftStatus::Stable);
    assert_eq!(dev.spike_count, 0);

    let stab = &snapshot.bundle.stability[&SensorType::Humidity];
    assert_eq!(stab.score, 100.0);
    assert_eq!((stab.stable_percent, stab.unstable_percent), (100, 0));

    // Other types have no data and are omitted, not zero-filled
    assert!(!snapshot.bundle.deviation.contains_key(&SensorType::Co2));
    assert_eq!(snapshot.sample_counts[&SensorType::Co2], 0);
}

#[tokio::test]
async fn single_sample_is_insufficient_data() {
    let (engine, _clock) = engine_at(t0() + Duration::minutes(5));
    engine.ingest(reading(SensorType::Light, 0, 450.0));

    let snapshot = engine.snapshot_all(Timeframe::Hour).await.unwrap();
    assert_eq!(snapshot.sample_counts[&SensorType::Light], 1);
    assert!(snapshot.bundle.deviation.is_empty());
    assert!(snapshot.bundle.stability.is_empty());
    assert!(snapshot.bundle.efficiency.is_none());
}

// ============================================================================
// Windowing & Eviction
// ============================================================================

#[tokio::test]
async fn reading_older_than_retention_never_contributes() {
    let mut config = EngineConfig::default();
    config.windows.enabled = vec![Timeframe::Hour, Timeframe::Day];
    let (engine, _clock) = engine_with(config, t0() + Duration::hours(30));

    for m in [0, 60, 120] {
        engine.ingest(reading(SensorType::Co2, 27 * 60 + m, 800.0 + m as f64));
    }
    let before = engine.snapshot_all(Timeframe::Day).await.unwrap();
    let before_json = serde_json::to_string(before.as_ref()).unwrap();

    // 30 hours old with a 24h retention
    assert_eq!(engine.ingest(reading(SensorType::Co2, 0, 5000.0)), AppendOutcome::Expired);

    let after = engine.snapshot_all(Timeframe::Day).await.unwrap();
    assert!(Arc::ptr_eq(&before, &after));
    let recomputed = engine.compute_snapshot(&after.key, engine.now());
    assert_eq!(serde_json::to_string(&recomputed).unwrap(), before_json);
}

#[tokio::test]
async fn periodic_eviction_bounds_the_store() {
    let mut config = EngineConfig::default();
    config.windows.enabled = vec![Timeframe::Hour];
    let (engine, clock) = engine_with(config, t0() + Duration::minutes(59));

    for m in 0..60 {
        engine.ingest(reading(SensorType::Temperature, m, 23.0));
    }
    assert_eq!(engine.store_stats().total_readings, 60);

    // No new data arrives; the timer alone must drop everything
    clock.advance(Duration::hours(2));
    let removed = engine.evict_expired();
    assert_eq!(removed[&SensorType::Temperature], 60);
    assert_eq!(engine.store_stats().total_readings, 0);
    assert!(engine.deviation_bundle(Timeframe::Hour).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_delivery_is_idempotent() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(2));
    let event = ReadingEvent {
        sensor_type: "soilMoisture".into(),
        value: 64.2,
        timestamp: "2026-07-14T06:30:00Z".into(),
        source_id: "probe-7".into(),
    };
    assert!(engine.ingest_event(event.clone()).unwrap().is_inserted());
    let cached = engine.snapshot_all(Timeframe::Day).await.unwrap();

    assert_eq!(engine.ingest_event(event).unwrap(), AppendOutcome::Duplicate);
    assert_eq!(engine.store_stats().total_readings, 1);
    assert!(Arc::ptr_eq(&cached, &engine.snapshot_all(Timeframe::Day).await.unwrap()));
}

#[tokio::test]
async fn out_of_order_arrivals_are_scored_in_time_order() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(4));
    for (m, v) in [(180, 26.0), (0, 20.0), (120, 24.0), (60, 22.0)] {
        engine.ingest(reading(SensorType::Temperature, m, v));
    }
    let dev = &engine.deviation_bundle(Timeframe::Day).await.unwrap()[&SensorType::Temperature];
    assert_eq!(dev.drift, 2.0);
    assert_eq!(dev.max_delta, 2.0);
    assert_eq!(dev.spike_count, 0);
}

// ============================================================================
// Caching
// ============================================================================

#[tokio::test]
async fn recompute_of_unchanged_window_is_byte_identical() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(6));
    ingest_hourly(&engine, SensorType::Co2, &[780.0, 820.0, 910.0, 990.0, 1040.0, 1100.0]);
    ingest_hourly(&engine, SensorType::Temperature, &[22.8, 23.1, 23.4, 23.9, 24.2, 24.6]);

    let first = engine.snapshot_all(Timeframe::Day).await.unwrap();
    engine.cache().clear();
    let second = engine.snapshot_all(Timeframe::Day).await.unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(
        serde_json::to_string(first.as_ref()).unwrap(),
        serde_json::to_string(second.as_ref()).unwrap()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_readers_share_one_compute() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(6));
    ingest_hourly(&engine, SensorType::Humidity, &[86.0, 87.5, 88.0, 89.0, 88.5, 88.0]);
    let computes_before = engine.cache().computes();

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.snapshot_all(Timeframe::Day).await.unwrap() })
        })
        .collect();
    let snapshots: Vec<_> = futures::future::join_all(tasks)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(engine.cache().computes() - computes_before, 1);
    assert!(snapshots.iter().all(|s| Arc::ptr_eq(s, &snapshots[0])));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_appends_keep_series_ordered() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(2));

    let tasks: Vec<_> = (0..4)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                for i in 0..30 {
                    let minute = i * 4 + worker;
                    engine.ingest(reading(SensorType::Temperature, minute, 23.0));
                    engine.ingest(reading(SensorType::Co2, minute, 800.0));
                }
            })
        })
        .collect();
    for r in futures::future::join_all(tasks).await {
        r.unwrap();
    }

    let stats = engine.store_stats();
    assert_eq!(stats.series[&SensorType::Temperature].readings, 120);
    assert_eq!(stats.series[&SensorType::Co2].readings, 120);
    assert_eq!(stats.series[&SensorType::Temperature].oldest, Some(t0()));

    let snapshot = engine.snapshot_all(Timeframe::Day).await.unwrap();
    assert_eq!(snapshot.bundle.deviation[&SensorType::Temperature].spike_count, 0);
    assert_eq!(snapshot.bundle.deviation[&SensorType::Temperature].drift, 0.0);
}

// ============================================================================
// Efficiency Episodes
// ============================================================================

#[tokio::test]
async fn co2_buildup_degrades_ventilation() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(12));
    ingest_hourly(&engine, SensorType::Temperature, &[23.0; 12]);
    let co2: Vec<f64> = (0..12).map(|i| 900.0 + 60.0 * i as f64).collect();
    ingest_hourly(&engine, SensorType::Co2, &co2);

    let profile = engine.efficiency(Timeframe::Day).await.unwrap().unwrap();
    let vent = profile.ventilation.expect("ventilation scored");
    assert!(vent.score < 75, "score {}", vent.score);
    assert_ne!(vent.status, SubsystemStatus::Optimal);
    let issue = vent.issue.expect("issue text");
    assert!(issue.starts_with("CO₂"), "{issue}");
    assert!(profile.water.is_none());
    assert!(profile.overall_score <= 100);
}

#[tokio::test]
async fn steady_room_is_optimal_everywhere() {
    let (engine, _clock) = engine_at(t0() + Duration::hours(6));
    for sensor_type in SensorType::ALL {
        let ideal = match sensor_type {
            SensorType::Temperature => 23.0,
            SensorType::Humidity => 88.0,
            SensorType::Co2 => 800.0,
            SensorType::Light => 500.0,
            SensorType::SoilMoisture => 65.0,
        };
        ingest_hourly(&engine, sensor_type, &[ideal; 6]);
    }

    let profile = engine.efficiency(Timeframe::Day).await.unwrap().unwrap();
    assert_eq!(profile.overall_score, 100);
    for score in [&profile.ventilation, &profile.water, &profile.energy] {
        let score = score.as_ref().unwrap();
        assert_eq!(score.status, SubsystemStatus::Optimal);
        assert!(score.issue.is_none());
    }
}
