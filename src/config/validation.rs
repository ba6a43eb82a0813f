//! Config validation: unknown-key detection with Levenshtein suggestions
//! and value range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;
use std::net::SocketAddr;

use super::{defaults, AdvisorConfig};
use crate::inference::fallback::CROP_CATALOG;

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

/// Returns the complete set of valid dotted key paths for `AdvisorConfig`.
///
/// Maintained by hand to match the struct hierarchy in `advisor_config.rs`.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        // [service]
        "service",
        "service.name",
        // [server]
        "server",
        "server.addr",
        // [models]
        "models",
        "models.dir",
        "models.classifier_file",
        "models.classifier_preprocessor_file",
        "models.regressor_file",
        "models.regressor_preprocessor_file",
        // [inference]
        "inference",
        "inference.top_n",
        "inference.min_probability",
        "inference.fallback_seed",
        // [fertilizer]
        "fertilizer",
        "fertilizer.profile",
        // [weather]
        "weather",
        "weather.provider",
        "weather.default_location",
        "weather.api_key",
        "weather.base_url",
        "weather.timeout_secs",
        // [storage]
        "storage",
        "storage.path",
        "storage.audit_enabled",
    ];
    keys.iter().copied().collect()
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

// ============================================================================
// Levenshtein Distance
// ============================================================================

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

/// Closest known key within edit distance 3. Ties go to the
/// lexicographically smaller key so suggestions are stable.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    known
        .iter()
        .map(|&k| (levenshtein(unknown, k), k))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, k)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Never fails on unknown keys; parse errors surface later through serde.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };

    let known = known_config_keys();
    walk_toml_keys(&value, "")
        .into_iter()
        .filter(|key| !known.contains(key.as_str()))
        .map(|key| ValidationWarning {
            suggestion: suggest_correction(&key, &known),
            message: format!("Unknown config key '{key}'"),
            field: key,
        })
        .collect()
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate value ranges on a parsed config.
///
/// Returns (errors, warnings): errors are impossible values that must
/// prevent startup; warnings are suspicious but not fatal.
pub fn validate_ranges(config: &AdvisorConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if config.server.addr.parse::<SocketAddr>().is_err() {
        errors.push(format!(
            "server.addr = '{}' is not a valid host:port socket address",
            config.server.addr
        ));
    }

    let top_n = config.inference.top_n;
    if top_n == 0 {
        errors.push("inference.top_n = 0 must be at least 1".to_string());
    } else if top_n > CROP_CATALOG.len() {
        warnings.push(ValidationWarning {
            field: "inference.top_n".to_string(),
            message: format!(
                "inference.top_n = {top_n} exceeds the {} known crops; fallback output is capped",
                CROP_CATALOG.len()
            ),
            suggestion: None,
        });
    }

    let p = config.inference.min_probability;
    let floor = defaults::DEFAULT_MIN_PROBABILITY;
    if !(floor..1.0).contains(&p) {
        errors.push(format!(
            "inference.min_probability = {p} must be in [{floor}, 1)"
        ));
    } else if p > 0.5 {
        warnings.push(ValidationWarning {
            field: "inference.min_probability".to_string(),
            message: format!("inference.min_probability = {p} will drop most classifier output"),
            suggestion: None,
        });
    }

    let m = &config.models;
    for (key, value) in [
        ("models.dir", &m.dir),
        ("models.classifier_file", &m.classifier_file),
        ("models.classifier_preprocessor_file", &m.classifier_preprocessor_file),
        ("models.regressor_file", &m.regressor_file),
        ("models.regressor_preprocessor_file", &m.regressor_preprocessor_file),
    ] {
        if value.trim().is_empty() {
            errors.push(format!("{key} must not be empty"));
        }
    }

    if config.weather.timeout_secs == 0 {
        errors.push("weather.timeout_secs = 0 must be > 0".to_string());
    }
    if config.weather.default_location.trim().is_empty() {
        errors.push("weather.default_location must not be empty".to_string());
    }

    if config.storage.path.trim().is_empty() {
        errors.push("storage.path must not be empty".to_string());
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
