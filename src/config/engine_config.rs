//! Engine Configuration - setpoints and scoring constants as TOML values
//!
//! Each struct implements `Default` with the values from [`super::defaults`],
//! so an empty or missing config file yields a fully working engine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::setpoints::SetpointRegistry;
use crate::types::{SensorType, Subsystem, Timeframe};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "MYCO_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "telemetry.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one telemetry engine instance.
///
/// Load with `EngineConfig::load()` which searches:
/// 1. `$MYCO_CONFIG` env var
/// 2. `./telemetry.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Site identification (logs and reports only)
    #[serde(default)]
    pub site: SiteInfo,

    /// Ideal value and tolerance band per sensor type
    #[serde(default)]
    pub setpoints: SetpointTable,

    /// Enabled analysis windows
    #[serde(default)]
    pub windows: WindowConfig,

    /// Drift classification
    #[serde(default)]
    pub drift: DriftConfig,

    /// Stability score weights
    #[serde(default)]
    pub stability: StabilityConfig,

    /// Efficiency penalties and subsystem weights
    #[serde(default)]
    pub efficiency: EfficiencyConfig,

    /// Background eviction
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
}

impl EngineConfig {
    /// Load configuration using the standard search order:
    /// 1. `$MYCO_CONFIG` environment variable
    /// 2. `./telemetry.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), site = %config.site.name, "Loaded engine config from MYCO_CONFIG");
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from MYCO_CONFIG, falling back");
                    }
                }
            } else {
                warn!(path = %path, "MYCO_CONFIG points to non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!(site = %config.site.name, "Loaded engine config from ./telemetry.toml");
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./telemetry.toml, using defaults");
                }
            }
        }

        info!("No telemetry.toml found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings (with a suggestion when one is
    /// close enough) and never fail the load.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::from("<inline>"), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Save config to a file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// Largest enabled timeframe; readings older than this are evicted.
    pub fn retention(&self) -> Timeframe {
        self.windows.enabled.iter().copied().max().unwrap_or(Timeframe::Month)
    }

    /// Validate every section, collecting all failures.
    ///
    /// Rules:
    /// - Each configured setpoint satisfies `min < ideal < max` with finite values
    /// - At least one timeframe is enabled
    /// - Stability weights are non-negative, sum to ≤ 1, and `unstable_weight ≥ 0.8`
    /// - Efficiency penalties are non-negative and subsystem weights sum to > 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(setpoint_errors) = SetpointRegistry::from_table(&self.setpoints) {
            errors.extend(setpoint_errors.iter().map(ToString::to_string));
        }

        if self.windows.enabled.is_empty() {
            errors.push("windows.enabled must list at least one timeframe".to_string());
        }

        if self.drift.deadband_per_hour < 0.0 {
            errors.push(format!(
                "drift.deadband_per_hour ({}) must be >= 0",
                self.drift.deadband_per_hour
            ));
        }

        let s = &self.stability;
        if s.fluctuation_weight < 0.0 || s.unstable_weight < 0.0 {
            errors.push("stability weights must be >= 0".to_string());
        }
        if s.fluctuation_weight + s.unstable_weight > 1.0 + f64::EPSILON {
            errors.push(format!(
                "stability.fluctuation_weight + unstable_weight must be <= 1.0, got {:.2}",
                s.fluctuation_weight + s.unstable_weight
            ));
        }
        if s.unstable_weight < 0.8 {
            errors.push(format!(
                "stability.unstable_weight ({:.2}) must be >= 0.8 so fully out-of-band windows score <= 20",
                s.unstable_weight
            ));
        }
        if s.fluctuation_ceiling <= 0.0 {
            errors.push("stability.fluctuation_ceiling must be > 0".to_string());
        }

        let e = &self.efficiency;
        for (name, value) in [
            ("stability_deficit_weight", e.stability_deficit_weight),
            ("spike_penalty", e.spike_penalty),
            ("spike_penalty_cap", e.spike_penalty_cap),
            ("drift_penalty_per_unit", e.drift_penalty_per_unit),
            ("drift_penalty_cap", e.drift_penalty_cap),
            ("energy_outside_weight", e.energy_outside_weight),
        ] {
            if value < 0.0 {
                errors.push(format!("efficiency.{name} ({value}) must be >= 0"));
            }
        }
        for subsystem in Subsystem::ALL {
            let threshold = e.issue_thresholds.threshold(subsystem);
            if !(0.0..=100.0).contains(&threshold) {
                errors.push(format!(
                    "efficiency.issue_thresholds.{subsystem} ({threshold}) must be within 0-100"
                ));
            }
        }
        let w = &e.weights;
        if w.ventilation < 0.0 || w.water < 0.0 || w.energy < 0.0 {
            errors.push("efficiency.weights must be >= 0".to_string());
        } else if w.ventilation + w.water + w.energy <= 0.0 {
            errors.push("efficiency.weights must not all be zero".to_string());
        }

        if self.maintenance.eviction_interval_secs == 0 {
            errors.push("maintenance.eviction_interval_secs must be > 0".to_string());
        }

        // NaN comparisons silently pass the checks above; sweep all floats via serialization
        if let Ok(value) = toml::Value::try_from(self) {
            for field in super::validation::non_finite_fields(&value, "") {
                errors.push(format!("{field} must be a finite number"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Site Info
// ============================================================================

/// Identification metadata, not used for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteInfo {
    #[serde(default = "default_site_name")]
    pub name: String,

    /// Grow room / zone label
    #[serde(default)]
    pub zone: String,
}

fn default_site_name() -> String {
    "DEFAULT".to_string()
}

impl Default for SiteInfo {
    fn default() -> Self {
        Self {
            name: default_site_name(),
            zone: String::new(),
        }
    }
}

// ============================================================================
// Setpoints
// ============================================================================

/// Setpoint for one sensor type as written in TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetpointConfig {
    pub min: f64,
    pub max: f64,

    /// Defaults to the band midpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ideal: Option<f64>,

    /// Rate (units/hour) above which a consecutive pair counts as a spike.
    /// Defaults to the built-in value for the sensor type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spike_rate_per_hour: Option<f64>,

    /// Decimal places used when rounding `avgDev` and `maxDelta`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decimals: Option<u32>,
}

impl SetpointConfig {
    fn from_defaults((min, max, ideal, spike_rate, decimals): defaults::SetpointDefaults) -> Self {
        Self {
            min,
            max,
            ideal: Some(ideal),
            spike_rate_per_hour: Some(spike_rate),
            decimals: Some(decimals),
        }
    }
}

/// Per-sensor-type setpoints. A type left out of the table is never scored.
///
/// When the `[setpoints]` section is absent entirely, all five types use the
/// built-in fruiting-room defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetpointTable {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<SetpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<SetpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<SetpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub light: Option<SetpointConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub soil_moisture: Option<SetpointConfig>,
}

impl SetpointTable {
    /// An empty table (nothing scored).
    pub fn empty() -> Self {
        Self {
            temperature: None,
            humidity: None,
            co2: None,
            light: None,
            soil_moisture: None,
        }
    }

    pub fn get(&self, sensor_type: SensorType) -> Option<&SetpointConfig> {
        match sensor_type {
            SensorType::Temperature => self.temperature.as_ref(),
            SensorType::Humidity => self.humidity.as_ref(),
            SensorType::Co2 => self.co2.as_ref(),
            SensorType::Light => self.light.as_ref(),
            SensorType::SoilMoisture => self.soil_moisture.as_ref(),
        }
    }

    pub fn set(&mut self, sensor_type: SensorType, setpoint: Option<SetpointConfig>) {
        let slot = match sensor_type {
            SensorType::Temperature => &mut self.temperature,
            SensorType::Humidity => &mut self.humidity,
            SensorType::Co2 => &mut self.co2,
            SensorType::Light => &mut self.light,
            SensorType::SoilMoisture => &mut self.soil_moisture,
        };
        *slot = setpoint;
    }

    /// Built-in default for one sensor type.
    pub fn default_for(sensor_type: SensorType) -> SetpointConfig {
        SetpointConfig::from_defaults(default_setpoint(sensor_type))
    }
}

/// Built-in (min, max, ideal, spike rate, decimals) tuple for a sensor type.
pub fn default_setpoint(sensor_type: SensorType) -> defaults::SetpointDefaults {
    match sensor_type {
        SensorType::Temperature => defaults::TEMPERATURE_SETPOINT,
        SensorType::Humidity => defaults::HUMIDITY_SETPOINT,
        SensorType::Co2 => defaults::CO2_SETPOINT,
        SensorType::Light => defaults::LIGHT_SETPOINT,
        SensorType::SoilMoisture => defaults::SOIL_MOISTURE_SETPOINT,
    }
}

impl Default for SetpointTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for sensor_type in SensorType::ALL {
            table.set(sensor_type, Some(Self::default_for(sensor_type)));
        }
        table
    }
}

// ============================================================================
// Windows
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Timeframes computed by the engine. The largest one sets retention.
    #[serde(default = "default_enabled_windows")]
    pub enabled: Vec<Timeframe>,
}

fn default_enabled_windows() -> Vec<Timeframe> {
    Timeframe::ALL.to_vec()
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_windows(),
        }
    }
}

// ============================================================================
// Drift
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Slopes within ±deadband (units/hour) are `stable`.
    #[serde(default = "default_deadband")]
    pub deadband_per_hour: f64,
}

fn default_deadband() -> f64 { defaults::DRIFT_DEADBAND_PER_HOUR }

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            deadband_per_hour: default_deadband(),
        }
    }
}

// ============================================================================
// Stability
// ============================================================================

/// `score = 100 - fluctuation_weight * normalize(fluctuation) - unstable_weight * unstablePercent`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_fluctuation_weight")]
    pub fluctuation_weight: f64,

    #[serde(default = "default_unstable_weight")]
    pub unstable_weight: f64,

    /// Fluctuation index that saturates the fluctuation term
    #[serde(default = "default_fluctuation_ceiling")]
    pub fluctuation_ceiling: f64,

    /// Mean magnitude below which CV falls back to plain stddev
    #[serde(default = "default_zero_mean_epsilon")]
    pub zero_mean_epsilon: f64,
}

fn default_fluctuation_weight() -> f64 { defaults::STABILITY_FLUCTUATION_WEIGHT }
fn default_unstable_weight() -> f64 { defaults::STABILITY_UNSTABLE_WEIGHT }
fn default_fluctuation_ceiling() -> f64 { defaults::STABILITY_FLUCTUATION_CEILING }
fn default_zero_mean_epsilon() -> f64 { defaults::STABILITY_ZERO_MEAN_EPSILON }

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            fluctuation_weight: default_fluctuation_weight(),
            unstable_weight: default_unstable_weight(),
            fluctuation_ceiling: default_fluctuation_ceiling(),
            zero_mean_epsilon: default_zero_mean_epsilon(),
        }
    }
}

// ============================================================================
// Efficiency
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EfficiencyConfig {
    /// Penalty per point of constituent stability-score deficit
    #[serde(default = "default_deficit_weight")]
    pub stability_deficit_weight: f64,

    #[serde(default = "default_spike_penalty")]
    pub spike_penalty: f64,

    #[serde(default = "default_spike_cap")]
    pub spike_penalty_cap: f64,

    /// Penalty per unit/hour of drift moving away from ideal
    #[serde(default = "default_drift_per_unit")]
    pub drift_penalty_per_unit: f64,

    #[serde(default = "default_drift_cap")]
    pub drift_penalty_cap: f64,

    /// Energy penalty per point of mean out-of-band percentage
    #[serde(default = "default_energy_outside")]
    pub energy_outside_weight: f64,

    /// Per-subsystem score below which an `issue` is reported
    #[serde(default)]
    pub issue_thresholds: IssueThresholds,

    /// Weights for `overallScore`
    #[serde(default)]
    pub weights: SubsystemWeights,
}

fn default_deficit_weight() -> f64 { defaults::EFFICIENCY_STABILITY_DEFICIT_WEIGHT }
fn default_spike_penalty() -> f64 { defaults::EFFICIENCY_SPIKE_PENALTY }
fn default_spike_cap() -> f64 { defaults::EFFICIENCY_SPIKE_PENALTY_CAP }
fn default_drift_per_unit() -> f64 { defaults::EFFICIENCY_DRIFT_PENALTY_PER_UNIT }
fn default_drift_cap() -> f64 { defaults::EFFICIENCY_DRIFT_PENALTY_CAP }
fn default_energy_outside() -> f64 { defaults::EFFICIENCY_ENERGY_OUTSIDE_WEIGHT }
fn default_issue_threshold() -> f64 { defaults::EFFICIENCY_ISSUE_THRESHOLD }

impl Default for EfficiencyConfig {
    fn default() -> Self {
        Self {
            stability_deficit_weight: default_deficit_weight(),
            spike_penalty: default_spike_penalty(),
            spike_penalty_cap: default_spike_cap(),
            drift_penalty_per_unit: default_drift_per_unit(),
            drift_penalty_cap: default_drift_cap(),
            energy_outside_weight: default_energy_outside(),
            issue_thresholds: IssueThresholds::default(),
            weights: SubsystemWeights::default(),
        }
    }
}

/// Relative weights of the subsystem scores in `overallScore`. Equal by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubsystemWeights {
    #[serde(default = "default_weight")]
    pub ventilation: f64,
    #[serde(default = "default_weight")]
    pub water: f64,
    #[serde(default = "default_weight")]
    pub energy: f64,
}

fn default_weight() -> f64 { 1.0 }

impl SubsystemWeights {
    pub fn weight(&self, subsystem: Subsystem) -> f64 {
        match subsystem {
            Subsystem::Ventilation => self.ventilation,
            Subsystem::Water => self.water,
            Subsystem::Energy => self.energy,
        }
    }
}

impl Default for SubsystemWeights {
    fn default() -> Self {
        Self {
            ventilation: default_weight(),
            water: default_weight(),
            energy: default_weight(),
        }
    }
}

/// Score below which each subsystem reports an `issue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueThresholds {
    #[serde(default = "default_issue_threshold")]
    pub ventilation: f64,
    #[serde(default = "default_issue_threshold")]
    pub water: f64,
    #[serde(default = "default_issue_threshold")]
    pub energy: f64,
}

impl IssueThresholds {
    pub fn threshold(&self, subsystem: Subsystem) -> f64 {
        match subsystem {
            Subsystem::Ventilation => self.ventilation,
            Subsystem::Water => self.water,
            Subsystem::Energy => self.energy,
        }
    }
}

impl Default for IssueThresholds {
    fn default() -> Self {
        Self {
            ventilation: default_issue_threshold(),
            water: default_issue_threshold(),
            energy: default_issue_threshold(),
        }
    }
}

// ============================================================================
// Maintenance
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaintenanceConfig {
    /// How often the background task evicts readings past retention (seconds)
    #[serde(default = "default_eviction_interval")]
    pub eviction_interval_secs: u64,
}

fn default_eviction_interval() -> u64 { defaults::EVICTION_INTERVAL_SECS }

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            eviction_interval_secs: default_eviction_interval(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
