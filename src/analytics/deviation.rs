//! Deviation & Spike Analyzer
//!
//! Rates are normalised to units/hour using each pair's real spacing. Pairs
//! sharing a timestamp (two sources reporting at the same instant) have no
//! defined rate and are skipped.

use crate::setpoints::Setpoint;
use crate::types::{DeviationStats, Reading};

use super::{drift, hours_between, round_to};

/// Consecutive pairs with positive spacing as `(from, to, rate per hour)`.
fn rated_pairs(samples: &[Reading]) -> impl Iterator<Item = (f64, f64, f64)> + '_ {
    samples.windows(2).filter_map(|pair| {
        let dh = hours_between(&pair[0], &pair[1]);
        (dh > 0.0).then(|| (pair[0].value, pair[1].value, (pair[1].value - pair[0].value) / dh))
    })
}

/// Worst absolute rate of change in the window (units/hour), 0 if undefined.
pub fn max_rate_per_hour(samples: &[Reading]) -> f64 {
    rated_pairs(samples).map(|(_, _, rate)| rate.abs()).fold(0.0, f64::max)
}

/// An excursion away from `baseline` opened by a qualifying jump.
#[derive(Debug, Clone, Copy)]
struct Excursion {
    baseline: f64,
    rising: bool,
}

impl Excursion {
    fn returned(&self, value: f64) -> bool {
        if self.rising {
            value <= self.baseline
        } else {
            value >= self.baseline
        }
    }
}

/// Count spike excursions.
///
/// A pair whose rate exceeds `threshold_per_hour` opens an excursion from the
/// pre-jump value. Until the series is back at that baseline, qualifying
/// pairs heading back are the return leg and are not counted, while further
/// jumps in the same direction each count. Sub-threshold pairs only close an
/// excursion when they reach the baseline.
pub fn count_spikes(samples: &[Reading], threshold_per_hour: f64) -> u32 {
    let mut count = 0;
    let mut open: Option<Excursion> = None;

    for (from, to, rate) in rated_pairs(samples) {
        let qualifying = rate.abs() > threshold_per_hour;
        let rising = rate > 0.0;

        if let Some(excursion) = open {
            if excursion.returned(to) {
                open = None;
            }
            if qualifying && rising == excursion.rising {
                count += 1;
            }
            continue;
        }

        if qualifying {
            count += 1;
            open = Some(Excursion { baseline: from, rising });
        }
    }
    count
}

/// Deviation stats for an ordered window, `None` with fewer than two samples.
pub fn deviation_stats(
    samples: &[Reading],
    setpoint: &Setpoint,
    deadband_per_hour: f64,
) -> Option<DeviationStats> {
    let trend = drift::estimate(samples, deadband_per_hour)?;

    let n = samples.len() as f64;
    let offsets = samples.iter().map(|r| r.value - setpoint.ideal);
    let (abs_sum, signed_sum) = offsets.fold((0.0, 0.0), |(a, s), o| (a + o.abs(), s + o));

    Some(DeviationStats {
        drift: round_to(trend.slope, 3),
        drift_status: trend.status,
        avg_dev: round_to(abs_sum / n, setpoint.decimals),
        max_delta: round_to(max_rate_per_hour(samples), setpoint.decimals),
        spike_count: count_spikes(samples, setpoint.spike_rate_per_hour),
        mean_offset: round_to(signed_sum / n, 3),
        samples: samples.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::test_support::{hourly, series};
    use crate::config::SetpointTable;
    use crate::types::{DriftStatus, SensorType};

    fn setpoint(sensor_type: SensorType) -> Setpoint {
        Setpoint::from_config(sensor_type, &SetpointTable::default_for(sensor_type)).unwrap()
    }

    #[test]
    fn test_greenhouse_scenario() {
        let samples = hourly(SensorType::Temperature, &[22.0, 23.0, 30.0, 23.0]);
        let stats = deviation_stats(&samples, &setpoint(SensorType::Temperature), 0.1).unwrap();
        assert_eq!(stats.spike_count, 1);
        assert_eq!(stats.avg_dev, 2.0);
        assert_eq!(stats.max_delta, 7.0);
        assert_eq!(stats.drift, 1.0);
        assert_eq!(stats.drift_status, DriftStatus::Rising);
        assert_eq!(stats.mean_offset, 1.5);
        assert_eq!(stats.samples, 4);
    }

    #[test]
    fn test_constant_stream_has_no_spikes() {
        let samples = hourly(SensorType::Co2, &[800.0; 10]);
        let stats = deviation_stats(&samples, &setpoint(SensorType::Co2), 0.1).unwrap();
        assert_eq!(stats.spike_count, 0);
        assert_eq!(stats.avg_dev, 0.0);
        assert_eq!(stats.max_delta, 0.0);
        assert_eq!(stats.drift_status, DriftStatus::Stable);
    }

    #[test]
    fn test_isolated_spike_counts_once_and_keeps_drift_stable() {
        let mut values = vec![23.0; 11];
        values[5] = 30.0;
        let samples = hourly(SensorType::Temperature, &values);
        let stats = deviation_stats(&samples, &setpoint(SensorType::Temperature), 0.1).unwrap();
        assert_eq!(stats.spike_count, 1);
        assert_eq!(stats.drift_status, DriftStatus::Stable);
    }

    #[test]
    fn test_rate_is_normalised_by_spacing() {
        // +2 over 15 minutes is 8/h, above the 5/h temperature threshold
        let fast = series(SensorType::Temperature, &[(0, 22.0), (15, 24.0)]);
        assert_eq!(max_rate_per_hour(&fast), 8.0);
        assert_eq!(count_spikes(&fast, 5.0), 1);

        // Same +2 spread over two hours is 1/h
        let slow = series(SensorType::Temperature, &[(0, 22.0), (120, 24.0)]);
        assert_eq!(max_rate_per_hour(&slow), 1.0);
        assert_eq!(count_spikes(&slow, 5.0), 0);
    }

    #[test]
    fn test_sustained_ramp_counts_each_pair() {
        let samples = hourly(SensorType::Temperature, &[18.0, 24.0, 30.0, 36.0]);
        assert_eq!(count_spikes(&samples, 5.0), 3);
    }

    #[test]
    fn test_repeated_excursions_count_separately() {
        let samples = hourly(SensorType::Temperature, &[23.0, 30.0, 23.0, 23.0, 30.0, 23.0]);
        assert_eq!(count_spikes(&samples, 5.0), 2);
    }

    #[test]
    fn test_plateau_before_return_counts_once() {
        let samples = hourly(SensorType::Temperature, &[23.0, 23.0, 30.0, 30.0, 23.0, 23.0]);
        assert_eq!(count_spikes(&samples, 5.0), 1);

        let mut values = vec![23.0; 12];
        values[5..8].fill(30.0);
        let stats = deviation_stats(
            &hourly(SensorType::Temperature, &values),
            &setpoint(SensorType::Temperature),
            0.1,
        )
        .unwrap();
        assert_eq!(stats.spike_count, 1);
        assert_eq!(stats.drift_status, DriftStatus::Stable);
    }

    #[test]
    fn test_return_split_over_several_pairs_counts_once() {
        // Fast return in 15 minute steps, each leg above 5/h
        let fast = series(
            SensorType::Temperature,
            &[(0, 23.0), (15, 30.0), (30, 27.0), (45, 25.0), (60, 23.0), (75, 23.0)],
        );
        assert_eq!(count_spikes(&fast, 5.0), 1);

        // Slow drift back below the threshold, then a new jump
        let slow = hourly(SensorType::Temperature, &[23.0, 30.0, 27.0, 24.0, 23.0, 30.0, 23.0]);
        assert_eq!(count_spikes(&slow, 5.0), 2);
    }

    #[test]
    fn test_falling_excursion_counts_once() {
        let samples = hourly(SensorType::Humidity, &[88.0, 70.0, 70.0, 88.0]);
        assert_eq!(count_spikes(&samples, 15.0), 1);
    }

    #[test]
    fn test_zero_spacing_pairs_are_skipped() {
        let samples = series(SensorType::Humidity, &[(0, 85.0), (0, 95.0), (60, 86.0)]);
        assert_eq!(max_rate_per_hour(&samples), 9.0);
        assert!(max_rate_per_hour(&samples).is_finite());
    }

    #[test]
    fn test_avg_dev_rounds_to_source_precision() {
        let samples = hourly(SensorType::Co2, &[800.4, 801.0, 802.0]);
        let stats = deviation_stats(&samples, &setpoint(SensorType::Co2), 0.1).unwrap();
        assert_eq!(stats.avg_dev, 1.0);
    }

    #[test]
    fn test_insufficient_data_is_omitted() {
        let samples = hourly(SensorType::Light, &[500.0]);
        assert!(deviation_stats(&samples, &setpoint(SensorType::Light), 0.1).is_none());
    }
}
