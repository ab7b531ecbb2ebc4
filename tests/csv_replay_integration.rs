//! CSV Replay Integration Test
//!
//! Exercises the CLI ingest path end to end: write a CSV export, load it
//! through `read_csv_events`, pump it through a `CsvSource` into an engine
//! driven by event time, then verify the derived bundle. The JSON-lines path
//! is checked the same way the CLI drives it, racing a report timer.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use myco_telemetry::source::{
    read_csv_events, CsvSource, JsonLinesSource, ReadingSource, SourceEvent,
};
use tokio::io::AsyncWriteExt;
use myco_telemetry::{
    AppendOutcome, Clock, EngineConfig, ManualClock, SensorType, SubsystemStatus,
    TelemetryEngine, Timeframe,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 8, 3, 0, 0, 0).unwrap()
}

/// Twelve hourly rows per sensor: humidity holds, soil moisture dries out
/// by 3 points an hour. Adds a duplicate row and a malformed row.
fn write_irrigation_lapse_csv() -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "timestamp,sensorType,value,sourceId").unwrap();
    for hour in 0..12 {
        let ts = (start() + Duration::hours(hour)).to_rfc3339();
        writeln!(file, "{ts},humidity,88.0,bed-3").unwrap();
        writeln!(file, "{ts},soilMoisture,{:.1},bed-3", 66.0 - 3.0 * hour as f64).unwrap();
    }
    writeln!(file, "{},humidity,88.0,bed-3", start().to_rfc3339()).unwrap();
    writeln!(file, "not,a,valid").unwrap();
    file
}

/// Replay everything from `source`, advancing the clock to the newest reading.
async fn replay(
    mut source: impl ReadingSource,
    engine: &TelemetryEngine,
    clock: &ManualClock,
) -> Vec<AppendOutcome> {
    let mut outcomes = Vec::new();
    loop {
        match source.next_event().await.unwrap() {
            SourceEvent::Reading(event) => {
                let reading = event.into_reading().unwrap();
                if reading.timestamp > clock.now() {
                    clock.set(reading.timestamp);
                }
                outcomes.push(engine.ingest(reading));
            }
            SourceEvent::Malformed(e) => panic!("CSV replay yielded a malformed event: {e}"),
            SourceEvent::Eof => break,
        }
    }
    outcomes
}

#[tokio::test]
async fn csv_replay_surfaces_irrigation_lapse() {
    let file = write_irrigation_lapse_csv();
    let events = read_csv_events(file.path()).unwrap();
    // Header and malformed row are skipped, the duplicate row is not
    assert_eq!(events.len(), 25);

    let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
    let engine = TelemetryEngine::with_clock(EngineConfig::default(), clock.clone()).unwrap();

    let outcomes = replay(CsvSource::new(events, 0), &engine, &clock).await;
    assert_eq!(outcomes.iter().filter(|o| o.is_inserted()).count(), 24);
    assert_eq!(outcomes.last(), Some(&AppendOutcome::Duplicate));
    assert_eq!(clock.now(), start() + Duration::hours(11));

    let snapshot = engine.snapshot_all(Timeframe::Day).await.unwrap();
    assert_eq!(snapshot.sample_counts[&SensorType::SoilMoisture], 12);
    assert_eq!(snapshot.sample_counts[&SensorType::Humidity], 12);

    let soil = &snapshot.bundle.deviation[&SensorType::SoilMoisture];
    assert_eq!(soil.drift, -3.0);
    assert_eq!(soil.spike_count, 0);
    assert_eq!(snapshot.bundle.stability[&SensorType::SoilMoisture].unstable_percent, 50);

    let profile = snapshot.bundle.efficiency.as_ref().unwrap();
    assert!(profile.ventilation.is_none());
    let water = profile.water.as_ref().unwrap();
    assert_ne!(water.status, SubsystemStatus::Optimal);
    assert!(water.issue.as_deref().unwrap().starts_with("Soil moisture"));
}

#[tokio::test]
async fn csv_replay_hour_window_sees_only_latest_readings() {
    let file = write_irrigation_lapse_csv();
    let events = read_csv_events(file.path()).unwrap();

    let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
    let engine = TelemetryEngine::with_clock(EngineConfig::default(), clock.clone()).unwrap();
    replay(CsvSource::new(events, 0), &engine, &clock).await;

    // 10:00 and 11:00 are the only rows inside [10:00, 11:00]
    let snapshot = engine.snapshot_all(Timeframe::Hour).await.unwrap();
    assert_eq!(snapshot.sample_counts[&SensorType::SoilMoisture], 2);
    assert_eq!(snapshot.bundle.deviation[&SensorType::SoilMoisture].drift, -3.0);
}

#[test]
fn missing_csv_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = read_csv_events(&dir.path().join("absent.csv")).unwrap_err();
    assert!(err.to_string().contains("absent.csv"));
}

#[tokio::test]
async fn json_line_split_across_report_tick_is_ingested() {
    let (mut writer, reader) = tokio::io::duplex(1024);
    let mut source = JsonLinesSource::new(reader, "pipe");
    let clock = Arc::new(ManualClock::new(DateTime::UNIX_EPOCH));
    let engine = TelemetryEngine::with_clock(EngineConfig::default(), clock.clone()).unwrap();

    let line = |hour: i64, value: f64| {
        format!(
            r#"{{"sensorType":"temperature","value":{value:.1},"timestamp":"{}","sourceId":"bay-1"}}"#,
            (start() + Duration::hours(hour)).to_rfc3339()
        )
    };
    let third = line(2, 25.0);
    let (head, tail) = third.split_at(third.find("\"timestamp\"").unwrap());

    writer
        .write_all(format!("{}\n{}\n{head}", line(0, 23.0), line(1, 24.0)).as_bytes())
        .await
        .unwrap();

    let mut report_timer = tokio::time::interval(std::time::Duration::from_millis(20));
    report_timer.tick().await;
    let mut ticks = 0;
    let mut inserted = 0;

    loop {
        tokio::select! {
            _ = report_timer.tick() => {
                ticks += 1;
                // The rest of the line only arrives after a tick has won the race
                if ticks == 1 {
                    writer.write_all(format!("{tail}\n").as_bytes()).await.unwrap();
                    writer.shutdown().await.unwrap();
                }
            }
            event = source.next_event() => match event.unwrap() {
                SourceEvent::Reading(event) => {
                    let reading = event.into_reading().unwrap();
                    clock.set(reading.timestamp);
                    if engine.ingest(reading).is_inserted() {
                        inserted += 1;
                    }
                }
                SourceEvent::Malformed(e) => panic!("split line was mangled: {e}"),
                SourceEvent::Eof => break,
            },
        }
    }

    assert!(ticks >= 1);
    assert_eq!(inserted, 3);
    assert_eq!(engine.store_stats().total_readings, 3);
}
