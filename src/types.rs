//! Shared data structures for greenhouse telemetry analytics
//!
//! This module defines the core types flowing through the engine:
//! - Ingestion: `ReadingEvent` (raw boundary event) and `Reading` (validated)
//! - Windowing: `SensorType`, `Timeframe`
//! - Derived stats: `DeviationStats`, `StabilityStats`, `EfficiencyProfile`
//! - Caching: `SnapshotKey`, `StatsBundle`, `Snapshot`

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Sensor Types
// ============================================================================

/// Environmental channel reported by greenhouse devices.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "camelCase")]
pub enum SensorType {
    /// Air temperature (°C)
    Temperature,
    /// Relative humidity (%RH)
    Humidity,
    /// CO₂ concentration (ppm)
    Co2,
    /// Illuminance (lux)
    Light,
    /// Substrate / soil moisture (%)
    SoilMoisture,
}

impl SensorType {
    /// Every sensor type, in canonical (sorted) order.
    pub const ALL: [SensorType; 5] = [
        SensorType::Temperature,
        SensorType::Humidity,
        SensorType::Co2,
        SensorType::Light,
        SensorType::SoilMoisture,
    ];

    /// Wire identifier (matches the serde representation)
    pub fn id(&self) -> &'static str {
        match self {
            SensorType::Temperature => "temperature",
            SensorType::Humidity => "humidity",
            SensorType::Co2 => "co2",
            SensorType::Light => "light",
            SensorType::SoilMoisture => "soilMoisture",
        }
    }

    /// Key used for this sensor type in TOML config tables
    pub fn config_key(&self) -> &'static str {
        match self {
            SensorType::SoilMoisture => "soil_moisture",
            other => other.id(),
        }
    }

    /// Human-readable label for issue text and logs
    pub fn label(&self) -> &'static str {
        match self {
            SensorType::Temperature => "Temperature",
            SensorType::Humidity => "Humidity",
            SensorType::Co2 => "CO₂",
            SensorType::Light => "Light",
            SensorType::SoilMoisture => "Soil moisture",
        }
    }
}

impl std::fmt::Display for SensorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for SensorType {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "temperature" | "temp" => Ok(SensorType::Temperature),
            "humidity" => Ok(SensorType::Humidity),
            "co2" | "co₂" => Ok(SensorType::Co2),
            "light" => Ok(SensorType::Light),
            "soilmoisture" | "soil_moisture" | "soil-moisture" => Ok(SensorType::SoilMoisture),
            _ => Err(IngestError::UnknownSensorType(s.to_string())),
        }
    }
}

// ============================================================================
// Timeframes
// ============================================================================

/// Fixed enumeration of analysis windows.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Timeframe {
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
    #[serde(rename = "30d")]
    Month,
}

impl Timeframe {
    pub const ALL: [Timeframe; 4] = [
        Timeframe::Hour,
        Timeframe::Day,
        Timeframe::Week,
        Timeframe::Month,
    ];

    /// Timeframe identifier as used by the dashboard (`1h`, `24h`, `7d`, `30d`)
    pub fn id(&self) -> &'static str {
        match self {
            Timeframe::Hour => "1h",
            Timeframe::Day => "24h",
            Timeframe::Week => "7d",
            Timeframe::Month => "30d",
        }
    }

    /// Window length
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::Hour => Duration::hours(1),
            Timeframe::Day => Duration::hours(24),
            Timeframe::Week => Duration::days(7),
            Timeframe::Month => Duration::days(30),
        }
    }

    /// Window length in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.duration().num_milliseconds()
    }

    /// First instant (inclusive) covered by this window at `now`.
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.duration()
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id())
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1h" | "hour" => Ok(Timeframe::Hour),
            "24h" | "1d" | "day" => Ok(Timeframe::Day),
            "7d" | "week" => Ok(Timeframe::Week),
            "30d" | "month" => Ok(Timeframe::Month),
            other => Err(format!("unknown timeframe '{other}' (expected 1h, 24h, 7d or 30d)")),
        }
    }
}

// ============================================================================
// Readings
// ============================================================================

/// Errors raised at the ingestion boundary. Rejected events are never stored.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    #[error("Unknown sensor type: {0}")]
    UnknownSensorType(String),

    #[error("Non-finite value for {0}: {1}")]
    NonFiniteValue(SensorType, f64),

    #[error("Invalid timestamp '{0}': {1}")]
    BadTimestamp(String, String),

    #[error("Reading has an empty source id")]
    EmptySourceId,
}

/// A single validated sensor reading. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    pub sensor_type: SensorType,
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
}

impl Reading {
    /// Build a reading, rejecting non-finite values and empty source ids.
    pub fn new(
        sensor_type: SensorType,
        value: f64,
        timestamp: DateTime<Utc>,
        source_id: impl Into<String>,
    ) -> Result<Self, IngestError> {
        if !value.is_finite() {
            return Err(IngestError::NonFiniteValue(sensor_type, value));
        }
        let source_id = source_id.into();
        if source_id.trim().is_empty() {
            return Err(IngestError::EmptySourceId);
        }
        Ok(Self {
            sensor_type,
            value,
            timestamp,
            source_id,
        })
    }

    /// Two readings are the same delivery when type, source and timestamp match.
    pub fn is_same_delivery(&self, other: &Reading) -> bool {
        self.timestamp == other.timestamp
            && self.sensor_type == other.sensor_type
            && self.source_id == other.source_id
    }
}

/// Raw reading event as delivered by the ingestion collaborator.
///
/// `sensorType` and `timestamp` arrive as strings and are only trusted after
/// [`ReadingEvent::into_reading`] succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingEvent {
    pub sensor_type: String,
    pub value: f64,
    pub timestamp: String,
    pub source_id: String,
}

impl ReadingEvent {
    /// Validate the event and convert it into a storable [`Reading`].
    pub fn into_reading(self) -> Result<Reading, IngestError> {
        let sensor_type: SensorType = self.sensor_type.parse()?;
        let timestamp = DateTime::parse_from_rfc3339(self.timestamp.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| IngestError::BadTimestamp(self.timestamp.clone(), e.to_string()))?;
        Reading::new(sensor_type, self.value, timestamp, self.source_id)
    }
}

// ============================================================================
// Deviation / Drift
// ============================================================================

/// Direction of the linear trend over a window
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    Rising,
    Falling,
    #[default]
    Stable,
}

impl std::fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DriftStatus::Rising => write!(f, "rising"),
            DriftStatus::Falling => write!(f, "falling"),
            DriftStatus::Stable => write!(f, "stable"),
        }
    }
}

/// Deviation and drift analytics for one sensor type in one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviationStats {
    /// OLS slope of value against elapsed hours (units/hour)
    pub drift: f64,
    /// Deadband classification of `drift`
    pub drift_status: DriftStatus,
    /// Mean absolute distance from the ideal setpoint
    pub avg_dev: f64,
    /// Worst observed rate of change between consecutive samples (units/hour)
    pub max_delta: f64,
    /// Spike excursions whose rate exceeded the sensor's threshold
    pub spike_count: u32,
    /// Signed mean of `value - ideal`
    pub mean_offset: f64,
    /// Samples in the window
    pub samples: usize,
}

// ============================================================================
// Stability
// ============================================================================

/// Stability analytics for one sensor type in one window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilityStats {
    /// Composite stability score, 0-100
    pub score: f64,
    /// Coefficient of variation as a percentage index
    pub fluctuation: f64,
    /// RMS distance from the ideal setpoint
    pub std_dev_ideal: f64,
    /// Longest in-band run (hours)
    pub max_stable: f64,
    /// Longest out-of-band run (hours)
    pub max_unstable: f64,
    pub stable_percent: u8,
    pub unstable_percent: u8,
}

// ============================================================================
// Efficiency
// ============================================================================

/// Farm subsystems scored by the efficiency scorer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Subsystem {
    Ventilation,
    Water,
    Energy,
}

impl Subsystem {
    pub const ALL: [Subsystem; 3] = [Subsystem::Ventilation, Subsystem::Water, Subsystem::Energy];

    /// Sensor types whose stats feed this subsystem's score.
    pub fn constituents(&self) -> &'static [SensorType] {
        match self {
            Subsystem::Ventilation => &[SensorType::Temperature, SensorType::Co2],
            Subsystem::Water => &[SensorType::SoilMoisture, SensorType::Humidity],
            Subsystem::Energy => &SensorType::ALL,
        }
    }

    /// Phrase appended to drift issues ("CO₂ trending up, ventilation lagging")
    pub fn lag_phrase(&self) -> &'static str {
        match self {
            Subsystem::Ventilation => "ventilation lagging",
            Subsystem::Water => "irrigation lagging",
            Subsystem::Energy => "conditioning working against setpoint",
        }
    }
}

impl std::fmt::Display for Subsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subsystem::Ventilation => write!(f, "ventilation"),
            Subsystem::Water => write!(f, "water"),
            Subsystem::Energy => write!(f, "energy"),
        }
    }
}

/// Score band label for a subsystem
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SubsystemStatus {
    #[serde(rename = "optimal")]
    Optimal,
    #[serde(rename = "good")]
    Good,
    #[serde(rename = "needs attention")]
    NeedsAttention,
    #[serde(rename = "critical")]
    Critical,
}

impl SubsystemStatus {
    /// Band a 0-100 score: ≥90 optimal, ≥75 good, ≥50 needs attention, else critical.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            SubsystemStatus::Optimal
        } else if score >= 75.0 {
            SubsystemStatus::Good
        } else if score >= 50.0 {
            SubsystemStatus::NeedsAttention
        } else {
            SubsystemStatus::Critical
        }
    }
}

impl std::fmt::Display for SubsystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubsystemStatus::Optimal => write!(f, "optimal"),
            SubsystemStatus::Good => write!(f, "good"),
            SubsystemStatus::NeedsAttention => write!(f, "needs attention"),
            SubsystemStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Score for one subsystem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsystemScore {
    pub score: u8,
    pub status: SubsystemStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issue: Option<String>,
}

/// Resource-efficiency view. A subsystem without any constituent stats is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ventilation: Option<SubsystemScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub water: Option<SubsystemScore>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<SubsystemScore>,
    pub overall_score: u8,
}

impl EfficiencyProfile {
    pub fn subsystem(&self, subsystem: Subsystem) -> Option<&SubsystemScore> {
        match subsystem {
            Subsystem::Ventilation => self.ventilation.as_ref(),
            Subsystem::Water => self.water.as_ref(),
            Subsystem::Energy => self.energy.as_ref(),
        }
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Cache key: timeframe plus the sorted, de-duplicated set of sensor types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotKey {
    pub timeframe: Timeframe,
    sensor_types: Vec<SensorType>,
}

impl SnapshotKey {
    pub fn new(timeframe: Timeframe, sensor_types: &[SensorType]) -> Self {
        let mut sensor_types = sensor_types.to_vec();
        sensor_types.sort_unstable();
        sensor_types.dedup();
        Self {
            timeframe,
            sensor_types,
        }
    }

    pub fn sensor_types(&self) -> &[SensorType] {
        &self.sensor_types
    }

    pub fn includes(&self, sensor_type: SensorType) -> bool {
        self.sensor_types.binary_search(&sensor_type).is_ok()
    }
}

impl std::fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types: Vec<&str> = self.sensor_types.iter().map(SensorType::id).collect();
        write!(f, "{}[{}]", self.timeframe, types.join(","))
    }
}

/// The three derived views for one key. Sensor types with fewer than two
/// samples in the window are absent from both maps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBundle {
    pub deviation: BTreeMap<SensorType, DeviationStats>,
    pub stability: BTreeMap<SensorType, StabilityStats>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub efficiency: Option<EfficiencyProfile>,
}

/// Immutable, published bundle of derived stats.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub key: SnapshotKey,
    pub bundle: StatsBundle,
    /// Samples seen per sensor type in the window (including types with <2 samples)
    pub sample_counts: BTreeMap<SensorType, usize>,
    pub computed_at: DateTime<Utc>,
    /// When the oldest contributing reading leaves the window
    pub expires_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Whether window rollover has made this snapshot stale at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| now >= t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sensor_type_wire_names() {
        assert_eq!(serde_json::to_string(&SensorType::SoilMoisture).unwrap(), "\"soilMoisture\"");
        assert_eq!(serde_json::to_string(&SensorType::Co2).unwrap(), "\"co2\"");
        assert_eq!("soil_moisture".parse::<SensorType>().unwrap(), SensorType::SoilMoisture);
        assert!("pressure".parse::<SensorType>().is_err());
    }

    #[test]
    fn test_timeframe_parse_and_duration() {
        assert_eq!("24h".parse::<Timeframe>().unwrap(), Timeframe::Day);
        assert_eq!(Timeframe::Week.duration_ms(), 7 * 24 * 3_600_000);
        assert!("2h".parse::<Timeframe>().is_err());
    }

    #[test]
    fn test_reading_event_rejects_malformed() {
        let ok = ReadingEvent {
            sensor_type: "co2".into(),
            value: 812.0,
            timestamp: "2026-03-01T10:00:00Z".into(),
            source_id: "room-a".into(),
        };
        let reading = ok.clone().into_reading().unwrap();
        assert_eq!(reading.sensor_type, SensorType::Co2);
        assert_eq!(reading.timestamp, Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap());

        let nan = ReadingEvent { value: f64::NAN, ..ok.clone() };
        assert!(matches!(nan.into_reading(), Err(IngestError::NonFiniteValue(_, _))));

        let bad_type = ReadingEvent { sensor_type: "radon".into(), ..ok.clone() };
        assert!(matches!(bad_type.into_reading(), Err(IngestError::UnknownSensorType(_))));

        let bad_ts = ReadingEvent { timestamp: "yesterday".into(), ..ok.clone() };
        assert!(matches!(bad_ts.into_reading(), Err(IngestError::BadTimestamp(_, _))));

        let no_source = ReadingEvent { source_id: "  ".into(), ..ok };
        assert_eq!(no_source.into_reading(), Err(IngestError::EmptySourceId));
    }

    #[test]
    fn test_snapshot_key_is_order_insensitive() {
        let a = SnapshotKey::new(Timeframe::Day, &[SensorType::Co2, SensorType::Temperature]);
        let b = SnapshotKey::new(
            Timeframe::Day,
            &[SensorType::Temperature, SensorType::Co2, SensorType::Co2],
        );
        assert_eq!(a, b);
        assert!(a.includes(SensorType::Co2));
        assert!(!a.includes(SensorType::Light));
        assert_eq!(a.to_string(), "24h[temperature,co2]");
    }

    #[test]
    fn test_status_bands() {
        assert_eq!(SubsystemStatus::from_score(95.0), SubsystemStatus::Optimal);
        assert_eq!(SubsystemStatus::from_score(75.0), SubsystemStatus::Good);
        assert_eq!(SubsystemStatus::from_score(60.0), SubsystemStatus::NeedsAttention);
        assert_eq!(SubsystemStatus::from_score(10.0), SubsystemStatus::Critical);
        assert_eq!(
            serde_json::to_string(&SubsystemStatus::NeedsAttention).unwrap(),
            "\"needs attention\""
        );
    }
}
