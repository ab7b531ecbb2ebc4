//! Config validation: unknown-key detection with Levenshtein suggestions
//! and a finite-number sweep.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

use crate::types::SensorType;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

const SETPOINT_FIELDS: [&str; 5] = ["min", "max", "ideal", "spike_rate_per_hour", "decimals"];

const STATIC_KEYS: &[&str] = &[
    // [site]
    "site",
    "site.name",
    "site.zone",
    // [setpoints]
    "setpoints",
    // [windows]
    "windows",
    "windows.enabled",
    // [drift]
    "drift",
    "drift.deadband_per_hour",
    // [stability]
    "stability",
    "stability.fluctuation_weight",
    "stability.unstable_weight",
    "stability.fluctuation_ceiling",
    "stability.zero_mean_epsilon",
    // [efficiency]
    "efficiency",
    "efficiency.stability_deficit_weight",
    "efficiency.spike_penalty",
    "efficiency.spike_penalty_cap",
    "efficiency.drift_penalty_per_unit",
    "efficiency.drift_penalty_cap",
    "efficiency.energy_outside_weight",
    "efficiency.issue_thresholds",
    "efficiency.issue_thresholds.ventilation",
    "efficiency.issue_thresholds.water",
    "efficiency.issue_thresholds.energy",
    "efficiency.weights",
    "efficiency.weights.ventilation",
    "efficiency.weights.water",
    "efficiency.weights.energy",
    // [maintenance]
    "maintenance",
    "maintenance.eviction_interval_secs",
];

/// Returns the complete set of valid dotted key paths for `EngineConfig`.
///
/// Setpoint keys are generated from [`SensorType::ALL`]; everything else must
/// be kept in step with `engine_config.rs` by hand.
pub fn known_config_keys() -> HashSet<String> {
    let mut keys: HashSet<String> = STATIC_KEYS.iter().map(|k| (*k).to_string()).collect();
    for sensor_type in SensorType::ALL {
        let section = format!("setpoints.{}", sensor_type.config_key());
        for field in SETPOINT_FIELDS {
            keys.insert(format!("{section}.{field}"));
        }
        keys.insert(section);
    }
    keys
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

/// Dotted paths of every float in the tree that is NaN or infinite.
pub fn non_finite_fields(value: &toml::Value, prefix: &str) -> Vec<String> {
    match value {
        toml::Value::Float(f) if !f.is_finite() => vec![prefix.to_string()],
        toml::Value::Table(table) => table
            .iter()
            .flat_map(|(k, v)| {
                let path = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                non_finite_fields(v, &path)
            })
            .collect(),
        toml::Value::Array(items) => items
            .iter()
            .enumerate()
            .flat_map(|(i, v)| non_finite_fields(v, &format!("{prefix}[{i}]")))
            .collect(),
        _ => Vec::new(),
    }
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
///
/// Ties resolve to the lexicographically smallest key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<String>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for k in known {
        let dist = levenshtein(unknown, k);
        if dist > 3 {
            continue;
        }
        best = match best {
            Some((best_key, best_dist))
                if dist > best_dist || (dist == best_dist && best_key < k.as_str()) =>
            {
                Some((best_key, best_dist))
            }
            _ => Some((k.as_str(), dist)),
        };
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// This does NOT fail on unknown keys, it only warns.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_identical() {
        assert_eq!(levenshtein("hello", "hello"), 0);
    }

    #[test]
    fn test_levenshtein_one_edit() {
        assert_eq!(levenshtein("deadbnd", "deadband"), 1);
    }

    #[test]
    fn test_levenshtein_empty() {
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
    }

    #[test]
    fn test_walk_toml_keys_nested() {
        let toml: toml::Value = r#"
            [setpoints]
            [setpoints.co2]
            min = 400.0
        "#
        .parse()
        .unwrap();
        let keys = walk_toml_keys(&toml, "");
        assert!(keys.contains(&"setpoints".to_string()));
        assert!(keys.contains(&"setpoints.co2".to_string()));
        assert!(keys.contains(&"setpoints.co2.min".to_string()));
    }

    #[test]
    fn test_typo_key_produces_warning_with_suggestion() {
        let toml_str = r#"
[drift]
deadband_per_hr = 0.2
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].field, "drift.deadband_per_hr");
        assert_eq!(warnings[0].suggestion.as_deref(), Some("drift.deadband_per_hour"));
    }

    #[test]
    fn test_unknown_sensor_section_warns() {
        let toml_str = r#"
[setpoints.radon]
min = 0.0
max = 100.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.iter().any(|w| w.field == "setpoints.radon"));
    }

    #[test]
    fn test_all_valid_keys_produce_zero_warnings() {
        let toml_str = r#"
[site]
name = "Oyster-1"

[setpoints.soil_moisture]
min = 55.0
max = 75.0
spike_rate_per_hour = 8.0

[efficiency.weights]
energy = 2.0
"#;
        let warnings = validate_unknown_keys(toml_str);
        assert!(warnings.is_empty(), "Expected 0 warnings, got: {:?}", warnings);
    }

    #[test]
    fn test_suggest_correction_no_match_for_garbage() {
        let known = known_config_keys();
        assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
    }

    #[test]
    fn test_known_keys_cover_every_sensor() {
        let known = known_config_keys();
        for sensor_type in SensorType::ALL {
            let key = format!("setpoints.{}.spike_rate_per_hour", sensor_type.config_key());
            assert!(known.contains(&key), "missing {key}");
        }
    }

    #[test]
    fn test_non_finite_fields_found() {
        let mut table = toml::map::Map::new();
        let mut inner = toml::map::Map::new();
        inner.insert("spike_penalty".into(), toml::Value::Float(f64::INFINITY));
        inner.insert("spike_penalty_cap".into(), toml::Value::Float(25.0));
        table.insert("efficiency".into(), toml::Value::Table(inner));
        let fields = non_finite_fields(&toml::Value::Table(table), "");
        assert_eq!(fields, vec!["efficiency.spike_penalty".to_string()]);
    }
}
