//! Drift Estimator
//!
//! Ordinary least-squares slope of value against elapsed hours. Unlike an
//! index-based trend, the x axis is real time, so irregular sampling does not
//! bend the slope.

use crate::types::{DriftStatus, Reading};

use super::hours_between;

/// Sxx below this is treated as "all timestamps identical".
const DEGENERATE_SXX: f64 = 1e-12;

/// Trend over one window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftEstimate {
    /// Units per hour
    pub slope: f64,
    pub status: DriftStatus,
}

/// Classify a slope against a symmetric deadband.
pub fn classify(slope: f64, deadband_per_hour: f64) -> DriftStatus {
    if slope > deadband_per_hour {
        DriftStatus::Rising
    } else if slope < -deadband_per_hour {
        DriftStatus::Falling
    } else {
        DriftStatus::Stable
    }
}

/// Estimate drift for an ordered window.
///
/// Returns `None` with fewer than two samples. When every timestamp is
/// identical the slope is undefined and reported as a stable zero.
pub fn estimate(samples: &[Reading], deadband_per_hour: f64) -> Option<DriftEstimate> {
    let first = samples.first()?;
    if samples.len() < 2 {
        return None;
    }

    let n = samples.len() as f64;
    let xs: Vec<f64> = samples.iter().map(|r| hours_between(first, r)).collect();
    let x_mean = xs.iter().sum::<f64>() / n;
    let y_mean = samples.iter().map(|r| r.value).sum::<f64>() / n;

    let mut sum_xy = 0.0;
    let mut sum_xx = 0.0;
    for (x, r) in xs.iter().zip(samples) {
        sum_xy += (x - x_mean) * (r.value - y_mean);
        sum_xx += (x - x_mean) * (x - x_mean);
    }

    if sum_xx < DEGENERATE_SXX {
        return Some(DriftEstimate {
            slope: 0.0,
            status: DriftStatus::Stable,
        });
    }

    let slope = sum_xy / sum_xx;
    Some(DriftEstimate {
        slope,
        status: classify(slope, deadband_per_hour),
    })
}
