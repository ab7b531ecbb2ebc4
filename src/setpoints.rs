//! Setpoint Registry
//!
//! Validated, read-only view of the configured ideal value, tolerance band
//! and spike threshold per sensor type. Built once at engine init; a broken
//! band fails the build instead of being scored against.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

use crate::config::{default_setpoint, SetpointConfig, SetpointTable};
use crate::types::SensorType;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SetpointError {
    #[error("setpoints.{0}: {1} must be finite (got {2})")]
    NonFinite(SensorType, &'static str, f64),

    #[error("setpoints.{0}: min ({1}) must be < max ({2})")]
    InvertedBand(SensorType, f64, f64),

    #[error("setpoints.{0}: ideal ({1}) must lie strictly between min ({2}) and max ({3})")]
    IdealOutsideBand(SensorType, f64, f64, f64),

    #[error("setpoints.{0}: spike_rate_per_hour ({1}) must be > 0")]
    NonPositiveSpikeRate(SensorType, f64),

    #[error("setpoints.{0}: decimals ({1}) must be <= 6")]
    TooManyDecimals(SensorType, u32),
}

/// A validated setpoint. Invariant: `min < ideal < max`, all finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Setpoint {
    pub min: f64,
    pub max: f64,
    pub ideal: f64,
    /// Consecutive-pair rate (units/hour) above which a spike is counted
    pub spike_rate_per_hour: f64,
    /// Rounding precision of the source values
    pub decimals: u32,
}

impl Setpoint {
    /// Validate a configured setpoint, filling absent optional fields.
    pub fn from_config(
        sensor_type: SensorType,
        config: &SetpointConfig,
    ) -> Result<Self, SetpointError> {
        let (_, _, _, default_rate, default_decimals) = default_setpoint(sensor_type);

        for (field, value) in [("min", config.min), ("max", config.max)] {
            if !value.is_finite() {
                return Err(SetpointError::NonFinite(sensor_type, field, value));
            }
        }
        if config.min >= config.max {
            return Err(SetpointError::InvertedBand(sensor_type, config.min, config.max));
        }

        let ideal = config.ideal.unwrap_or((config.min + config.max) / 2.0);
        if !ideal.is_finite() {
            return Err(SetpointError::NonFinite(sensor_type, "ideal", ideal));
        }
        if ideal <= config.min || ideal >= config.max {
            return Err(SetpointError::IdealOutsideBand(
                sensor_type,
                ideal,
                config.min,
                config.max,
            ));
        }

        let spike_rate_per_hour = config.spike_rate_per_hour.unwrap_or(default_rate);
        if !spike_rate_per_hour.is_finite() || spike_rate_per_hour <= 0.0 {
            return Err(SetpointError::NonPositiveSpikeRate(sensor_type, spike_rate_per_hour));
        }

        let decimals = config.decimals.unwrap_or(default_decimals);
        if decimals > 6 {
            return Err(SetpointError::TooManyDecimals(sensor_type, decimals));
        }

        Ok(Self {
            min: config.min,
            max: config.max,
            ideal,
            spike_rate_per_hour,
            decimals,
        })
    }

    /// Whether `value` lies inside the stability band `[min, max]`.
    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Setpoints for every scored sensor type.
#[derive(Debug, Clone, Default)]
pub struct SetpointRegistry {
    setpoints: BTreeMap<SensorType, Setpoint>,
}

impl SetpointRegistry {
    /// Build from a config table, reporting every invalid entry.
    pub fn from_table(table: &SetpointTable) -> Result<Self, Vec<SetpointError>> {
        let mut setpoints = BTreeMap::new();
        let mut errors = Vec::new();

        for sensor_type in SensorType::ALL {
            let Some(config) = table.get(sensor_type) else {
                debug!(sensor = %sensor_type, "No setpoint configured, type will not be scored");
                continue;
            };
            match Setpoint::from_config(sensor_type, config) {
                Ok(setpoint) => {
                    setpoints.insert(sensor_type, setpoint);
                }
                Err(e) => errors.push(e),
            }
        }

        if errors.is_empty() {
            Ok(Self { setpoints })
        } else {
            Err(errors)
        }
    }

    pub fn get(&self, sensor_type: SensorType) -> Option<&Setpoint> {
        self.setpoints.get(&sensor_type)
    }

    pub fn contains(&self, sensor_type: SensorType) -> bool {
        self.setpoints.contains_key(&sensor_type)
    }

    /// Scored sensor types in canonical order.
    pub fn sensor_types(&self) -> Vec<SensorType> {
        self.setpoints.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.setpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.setpoints.is_empty()
    }
}
