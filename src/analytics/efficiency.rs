//! Efficiency Scorer
//!
//! Deterministic, rule-based subsystem scores derived from the deviation and
//! stability views of the same window.
//!
//! # Scoring Algorithm
//!
//! Ventilation (temperature, CO₂) and water (soil moisture, humidity) score
//! `100 - Σ penalty` over their constituent sensors, where each sensor's
//! penalty is:
//! - `stability_deficit_weight × (100 − stability score)`
//! - `spike_penalty × spikeCount`, saturating at `spike_penalty_cap`
//! - `drift_penalty_per_unit × |drift|`, capped at `drift_penalty_cap`, only
//!   when drift is non-stable and pushing further from the ideal
//!
//! Energy uses every scored sensor as a proxy for conditioning effort:
//! `energy_outside_weight × mean(unstablePercent)` plus the same wrong-way
//! drift penalty per sensor.

use std::collections::BTreeMap;
use tracing::debug;

use crate::config::EfficiencyConfig;
use crate::types::{
    DeviationStats, DriftStatus, EfficiencyProfile, SensorType, StabilityStats, Subsystem,
    SubsystemScore, SubsystemStatus,
};

use super::round_to;

/// Penalty breakdown for one sensor inside one subsystem.
#[derive(Debug, Clone, Copy)]
struct SensorPenalty {
    sensor_type: SensorType,
    out_of_band: f64,
    spikes: f64,
    drift: f64,
}

impl SensorPenalty {
    fn total(&self) -> f64 {
        self.out_of_band + self.spikes + self.drift
    }
}

/// Drift penalty when the trend moves the sensor further from its ideal.
fn wrong_way_drift(dev: &DeviationStats, config: &EfficiencyConfig) -> f64 {
    if dev.drift_status == DriftStatus::Stable || dev.mean_offset == 0.0 {
        return 0.0;
    }
    if dev.drift.signum() != dev.mean_offset.signum() {
        return 0.0;
    }
    (dev.drift.abs() * config.drift_penalty_per_unit).min(config.drift_penalty_cap)
}

fn sensor_penalty(
    subsystem: Subsystem,
    sensor_type: SensorType,
    dev: &DeviationStats,
    stab: &StabilityStats,
    config: &EfficiencyConfig,
    scored_types: usize,
) -> SensorPenalty {
    let drift = wrong_way_drift(dev, config);
    match subsystem {
        Subsystem::Energy => SensorPenalty {
            sensor_type,
            out_of_band: config.energy_outside_weight * f64::from(stab.unstable_percent)
                / scored_types as f64,
            spikes: 0.0,
            drift,
        },
        Subsystem::Ventilation | Subsystem::Water => SensorPenalty {
            sensor_type,
            out_of_band: config.stability_deficit_weight * (100.0 - stab.score).max(0.0),
            spikes: (f64::from(dev.spike_count) * config.spike_penalty)
                .min(config.spike_penalty_cap),
            drift,
        },
    }
}

/// Name the dominant contributor and its problem.
fn describe_issue(
    subsystem: Subsystem,
    worst: &SensorPenalty,
    dev: &DeviationStats,
    stab: &StabilityStats,
) -> String {
    let label = worst.sensor_type.label();

    if worst.drift >= worst.spikes && worst.drift >= worst.out_of_band && worst.drift > 0.0 {
        let direction = if dev.drift > 0.0 { "up" } else { "down" };
        return format!("{label} trending {direction}, {}", subsystem.lag_phrase());
    }
    if worst.spikes > worst.out_of_band {
        return format!("{label} spiking ({} spikes in window)", dev.spike_count);
    }

    let problem = if stab.unstable_percent > 0 {
        format!("{label} outside setpoint band {}% of the time", stab.unstable_percent)
    } else {
        format!("{label} fluctuating ({}% variation)", stab.fluctuation)
    };
    match subsystem {
        Subsystem::Energy => format!("{problem}, conditioning running long"),
        _ => problem,
    }
}

fn score_subsystem(
    subsystem: Subsystem,
    deviation: &BTreeMap<SensorType, DeviationStats>,
    stability: &BTreeMap<SensorType, StabilityStats>,
    config: &EfficiencyConfig,
) -> Option<SubsystemScore> {
    let present: Vec<(SensorType, &DeviationStats, &StabilityStats)> = subsystem
        .constituents()
        .iter()
        .filter_map(|t| Some((*t, deviation.get(t)?, stability.get(t)?)))
        .collect();
    if present.is_empty() {
        return None;
    }

    let penalties: Vec<SensorPenalty> = present
        .iter()
        .map(|(t, dev, stab)| sensor_penalty(subsystem, *t, dev, stab, config, present.len()))
        .collect();
    let total: f64 = penalties.iter().map(SensorPenalty::total).sum();
    let raw = (100.0 - total).clamp(0.0, 100.0);
    let score = raw.round() as u8;

    // Gate on the published score so `issue` never disagrees with it
    let issue = if f64::from(score) < config.issue_thresholds.threshold(subsystem) {
        penalties
            .iter()
            .zip(&present)
            .max_by(|(a, _), (b, _)| a.total().total_cmp(&b.total()))
            .map(|(worst, (_, dev, stab))| describe_issue(subsystem, worst, dev, stab))
    } else {
        None
    };

    debug!(
        subsystem = %subsystem,
        score,
        penalty = round_to(total, 2),
        sensors = present.len(),
        "Subsystem scored"
    );

    Some(SubsystemScore {
        score,
        status: SubsystemStatus::from_score(f64::from(score)),
        issue,
    })
}

/// Derive the efficiency profile from one window's deviation and stability
/// maps. Returns `None` when no subsystem has any constituent data.
pub fn efficiency_profile(
    deviation: &BTreeMap<SensorType, DeviationStats>,
    stability: &BTreeMap<SensorType, StabilityStats>,
    config: &EfficiencyConfig,
) -> Option<EfficiencyProfile> {
    let scores: BTreeMap<Subsystem, SubsystemScore> = Subsystem::ALL
        .iter()
        .filter_map(|s| Some((*s, score_subsystem(*s, deviation, stability, config)?)))
        .collect();
    if scores.is_empty() {
        return None;
    }

    let weighted: Vec<(f64, f64)> = scores
        .iter()
        .map(|(s, score)| (config.weights.weight(*s), f64::from(score.score)))
        .collect();
    let weight_sum: f64 = weighted.iter().map(|(w, _)| w).sum();
    let overall = if weight_sum > 0.0 {
        weighted.iter().map(|(w, v)| w * v).sum::<f64>() / weight_sum
    } else {
        // Every present subsystem has zero weight; fall back to a plain mean
        weighted.iter().map(|(_, v)| v).sum::<f64>() / weighted.len() as f64
    };

    Some(EfficiencyProfile {
        ventilation: scores.get(&Subsystem::Ventilation).cloned(),
        water: scores.get(&Subsystem::Water).cloned(),
        energy: scores.get(&Subsystem::Energy).cloned(),
        overall_score: overall.round().clamp(0.0, 100.0) as u8,
    })
}
