//! Analytics Module
//!
//! Pure functions from an ordered window of readings (plus setpoints and
//! scoring constants) to derived stats. Nothing here holds state, so every
//! view can be recomputed at any time from the store.
//!
//! - `drift`: OLS trend slope and deadband classification
//! - `deviation`: distance from ideal, worst rate of change, spike count
//! - `stability`: fluctuation index, band membership, composite score
//! - `efficiency`: per-subsystem scores derived from the two views above

pub mod deviation;
pub mod drift;
pub mod efficiency;
pub mod stability;

pub use deviation::{count_spikes, deviation_stats, max_rate_per_hour};
pub use drift::{classify, estimate, DriftEstimate};
pub use efficiency::efficiency_profile;
pub use stability::stability_stats;

use crate::types::Reading;

/// Round `value` to `decimals` places. Negative zero is normalised to zero.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    let rounded = (value * factor).round() / factor;
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}

/// Hours elapsed between two readings (negative if `b` precedes `a`).
pub(crate) fn hours_between(a: &Reading, b: &Reading) -> f64 {
    (b.timestamp - a.timestamp).num_milliseconds() as f64 / 3_600_000.0
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use crate::types::{Reading, SensorType};

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 6, 0, 0).unwrap()
    }

    /// Readings at `(minutes offset, value)` pairs from a single source.
    pub fn series(sensor_type: SensorType, points: &[(i64, f64)]) -> Vec<Reading> {
        points
            .iter()
            .map(|&(m, v)| Reading::new(sensor_type, v, t0() + Duration::minutes(m), "probe-1").unwrap())
            .collect()
    }

    /// Hourly readings starting at `t0`.
    pub fn hourly(sensor_type: SensorType, values: &[f64]) -> Vec<Reading> {
        let points: Vec<(i64, f64)> = values
            .iter()
            .enumerate()
            .map(|(i, &v)| (i as i64 * 60, v))
            .collect();
        series(sensor_type, &points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(2.345, 2), 2.35);
        assert_eq!(round_to(812.6, 0), 813.0);
        assert_eq!(round_to(-0.0004, 3), 0.0);
        assert!(round_to(-0.0004, 3).is_sign_positive());
    }
}
