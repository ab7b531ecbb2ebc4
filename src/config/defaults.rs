//! System-wide default constants.
//!
//! Every tunable here has a matching TOML field in [`super::EngineConfig`];
//! these values are used when the field is absent.

// ============================================================================
// Drift
// ============================================================================

/// Slopes within ±this many units/hour classify as `stable`.
pub const DRIFT_DEADBAND_PER_HOUR: f64 = 0.1;

// ============================================================================
// Stability
// ============================================================================

/// Weight applied to the normalized fluctuation index (w1).
pub const STABILITY_FLUCTUATION_WEIGHT: f64 = 0.2;

/// Weight applied to the out-of-band percentage (w2).
///
/// Must stay ≥ 0.8 so that a window entirely outside the band scores ≤ 20.
pub const STABILITY_UNSTABLE_WEIGHT: f64 = 0.8;

/// Fluctuation index (CV %) that maps to a fully penalized fluctuation term.
pub const STABILITY_FLUCTUATION_CEILING: f64 = 25.0;

/// Below this absolute mean the coefficient of variation falls back to stddev.
pub const STABILITY_ZERO_MEAN_EPSILON: f64 = 1e-9;

// ============================================================================
// Efficiency
// ============================================================================

/// Penalty per point of stability-score deficit of a constituent sensor.
pub const EFFICIENCY_STABILITY_DEFICIT_WEIGHT: f64 = 0.5;

/// Penalty per counted spike.
pub const EFFICIENCY_SPIKE_PENALTY: f64 = 5.0;

/// Spike penalty saturates at this value per sensor.
pub const EFFICIENCY_SPIKE_PENALTY_CAP: f64 = 25.0;

/// Penalty per unit/hour of drift away from ideal.
pub const EFFICIENCY_DRIFT_PENALTY_PER_UNIT: f64 = 10.0;

/// Wrong-way drift penalty saturates at this value per sensor.
pub const EFFICIENCY_DRIFT_PENALTY_CAP: f64 = 20.0;

/// Energy penalty per point of mean out-of-band percentage.
pub const EFFICIENCY_ENERGY_OUTSIDE_WEIGHT: f64 = 0.6;

/// Subsystem scores below this carry an `issue` description.
pub const EFFICIENCY_ISSUE_THRESHOLD: f64 = 75.0;

// ============================================================================
// Maintenance
// ============================================================================

/// Periodic eviction interval (seconds).
pub const EVICTION_INTERVAL_SECS: u64 = 60;

/// Capacity of the sample-change broadcast channel.
pub const CHANGE_CHANNEL_CAPACITY: usize = 256;

// ============================================================================
// Setpoints (mycelium fruiting room)
// ============================================================================

/// (min, max, ideal, spike rate per hour, decimals)
pub type SetpointDefaults = (f64, f64, f64, f64, u32);

pub const TEMPERATURE_SETPOINT: SetpointDefaults = (18.0, 28.0, 23.0, 5.0, 1);
pub const HUMIDITY_SETPOINT: SetpointDefaults = (80.0, 95.0, 88.0, 15.0, 1);
pub const CO2_SETPOINT: SetpointDefaults = (400.0, 1200.0, 800.0, 300.0, 0);
pub const LIGHT_SETPOINT: SetpointDefaults = (100.0, 1000.0, 500.0, 2000.0, 0);
pub const SOIL_MOISTURE_SETPOINT: SetpointDefaults = (50.0, 80.0, 65.0, 10.0, 1);
