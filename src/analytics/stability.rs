//! Stability Scorer
//!
//! ## Score
//!
//! ```text
//! fluctuation = 100 * stddev / |mean|        (stddev alone when mean ~ 0)
//! normalized  = min(fluctuation / ceiling, 1) * 100
//! score       = 100 - w1 * normalized - w2 * unstablePercent   (clamped 0-100)
//! ```
//!
//! With the default weights (0.2 / 0.8) a flat series on the ideal scores 100
//! and a series entirely outside the band scores at most 20.

use statrs::statistics::Statistics;

use crate::config::StabilityConfig;
use crate::setpoints::Setpoint;
use crate::types::{Reading, StabilityStats};

use super::{hours_between, round_to};

/// Integer (stable, unstable) percentages that always sum to 100.
///
/// The stable share is rounded to the nearest integer and the unstable share
/// takes the complement, so the rounding remainder lands on the majority.
pub fn split_percent(stable: usize, total: usize) -> (u8, u8) {
    if total == 0 {
        return (0, 0);
    }
    let stable_pct = (100.0 * stable as f64 / total as f64).round().clamp(0.0, 100.0) as u8;
    (stable_pct, 100 - stable_pct)
}

/// Longest contiguous (in-band, out-of-band) runs in hours.
///
/// A run spans its first to last timestamp, so a single-sample run is 0.
fn longest_runs(samples: &[Reading], setpoint: &Setpoint) -> (f64, f64) {
    let mut max_stable: f64 = 0.0;
    let mut max_unstable: f64 = 0.0;

    let mut record = |start: &Reading, end: &Reading, in_band: bool| {
        let hours = hours_between(start, end);
        if in_band {
            max_stable = max_stable.max(hours);
        } else {
            max_unstable = max_unstable.max(hours);
        }
    };

    let Some(first) = samples.first() else {
        return (0.0, 0.0);
    };
    let mut run_start = first;
    let mut run_end = first;
    let mut run_in_band = setpoint.contains(first.value);

    for r in &samples[1..] {
        let in_band = setpoint.contains(r.value);
        if in_band != run_in_band {
            record(run_start, run_end, run_in_band);
            run_start = r;
            run_in_band = in_band;
        }
        run_end = r;
    }
    record(run_start, run_end, run_in_band);

    (max_stable, max_unstable)
}

/// Fluctuation index: coefficient of variation as a percentage.
pub fn fluctuation_index(values: &[f64], zero_mean_epsilon: f64) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().mean();
    let std_dev = values.iter().population_std_dev();
    if !std_dev.is_finite() {
        return 0.0;
    }
    if mean.abs() < zero_mean_epsilon {
        std_dev
    } else {
        100.0 * std_dev / mean.abs()
    }
}

/// Stability stats for an ordered window, `None` with fewer than two samples.
pub fn stability_stats(
    samples: &[Reading],
    setpoint: &Setpoint,
    config: &StabilityConfig,
) -> Option<StabilityStats> {
    if samples.len() < 2 {
        return None;
    }

    let values: Vec<f64> = samples.iter().map(|r| r.value).collect();
    let n = values.len() as f64;

    let fluctuation = fluctuation_index(&values, config.zero_mean_epsilon);
    let std_dev_ideal = (values
        .iter()
        .map(|v| (v - setpoint.ideal).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();

    let in_band = values.iter().filter(|v| setpoint.contains(**v)).count();
    let (stable_percent, unstable_percent) = split_percent(in_band, values.len());
    let (max_stable, max_unstable) = longest_runs(samples, setpoint);

    let normalized = (fluctuation / config.fluctuation_ceiling).min(1.0) * 100.0;
    let score = (100.0
        - config.fluctuation_weight * normalized
        - config.unstable_weight * f64::from(unstable_percent))
    .clamp(0.0, 100.0);

    Some(StabilityStats {
        score: round_to(score, 1),
        fluctuation: round_to(fluctuation, 2),
        std_dev_ideal: round_to(std_dev_ideal, 2),
        max_stable: round_to(max_stable, 2),
        max_unstable: round_to(max_unstable, 2),
        stable_percent,
        unstable_percent,
    })
}
