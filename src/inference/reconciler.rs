//! Feature Reconciler
//!
//! Maps heterogeneous request keys onto the canonical soil-sample schema and
//! pads the columns a model artifact expects.
//!
//! ## Reconciliation table
//!
//! Each canonical field lists the request keys it accepts, highest priority
//! first. The first key that is present with a non-missing value wins. A
//! field with no usable key becomes `FeatureValue::Missing`, never zero.
//!
//! | canonical         | accepted keys                  |
//! |-------------------|--------------------------------|
//! | `soil_n`          | `soil_n`, `N`                  |
//! | `soil_p`          | `soil_p`, `P`                  |
//! | `soil_k`          | `soil_k`, `K`                  |
//! | `soil_ph`         | `soil_ph`, `ph`                |
//! | `avg_temperature` | `avg_temperature`, `temperature` |
//! | `avg_rainfall`    | `avg_rainfall`, `rainfall`     |
//! | `humidity`        | `humidity`                     |
//!
//! Categorical fields (`state`, `district`, `agro_climatic_zone`, `season`,
//! `crop_type`) accept only their own name and never fault.
//!
//! Artifacts trained on the short keys (`N, P, K, temperature, humidity, ph,
//! rainfall`) get those columns filled from the resolved canonical values.

use thiserror::Error;

use crate::types::{columns, FeatureRecord, FeatureValue};

/// Input faults reported back to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InputError {
    #[error("invalid numeric value for '{field}': {value}")]
    InvalidNumber { field: String, value: String },

    #[error("No input data provided")]
    Empty,
}

/// How a canonical field is converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Must convert to a finite float, otherwise `InputError::InvalidNumber`
    Numeric,
    /// Passed through as text; never faults
    Categorical,
}

/// One row of the reconciliation table.
#[derive(Debug, Clone, Copy)]
pub struct FieldRule {
    pub canonical: &'static str,
    /// Accepted request keys, highest priority first
    pub sources: &'static [&'static str],
    pub kind: FieldKind,
}

/// Canonical schema, in output column order.
pub const RECONCILIATION_TABLE: &[FieldRule] = &[
    FieldRule {
        canonical: columns::NITROGEN,
        sources: &["soil_n", "N"],
        kind: FieldKind::Numeric,
    },
    FieldRule {
        canonical: columns::PHOSPHORUS,
        sources: &["soil_p", "P"],
        kind: FieldKind::Numeric,
    },
    FieldRule {
        canonical: columns::POTASSIUM,
        sources: &["soil_k", "K"],
        kind: FieldKind::Numeric,
    },
    FieldRule {
        canonical: columns::PH,
        sources: &["soil_ph", "ph"],
        kind: FieldKind::Numeric,
    },
    FieldRule {
        canonical: columns::TEMPERATURE,
        sources: &["avg_temperature", "temperature"],
        kind: FieldKind::Numeric,
    },
    FieldRule {
        canonical: columns::RAINFALL,
        sources: &["avg_rainfall", "rainfall"],
        kind: FieldKind::Numeric,
    },
    FieldRule {
        canonical: columns::HUMIDITY,
        sources: &["humidity"],
        kind: FieldKind::Numeric,
    },
    FieldRule {
        canonical: columns::STATE,
        sources: &["state"],
        kind: FieldKind::Categorical,
    },
    FieldRule {
        canonical: columns::DISTRICT,
        sources: &["district"],
        kind: FieldKind::Categorical,
    },
    FieldRule {
        canonical: columns::ZONE,
        sources: &["agro_climatic_zone"],
        kind: FieldKind::Categorical,
    },
    FieldRule {
        canonical: columns::SEASON,
        sources: &["season"],
        kind: FieldKind::Categorical,
    },
    FieldRule {
        canonical: columns::CROP_TYPE,
        sources: &["crop_type"],
        kind: FieldKind::Categorical,
    },
];

/// Reconcile a raw request record against an artifact's expected columns.
///
/// 1. Canonical fields are resolved through [`RECONCILIATION_TABLE`].
/// 2. Keys that no rule consumes are passed through unchanged, in input order.
/// 3. With `expected_columns`, the record is laid out by [`align_expected`].
///
/// Reconciling an already-reconciled record with the same `expected_columns`
/// returns an identical record.
pub fn reconcile(
    raw: &FeatureRecord,
    expected_columns: Option<&[String]>,
) -> Result<FeatureRecord, InputError> {
    let normalized = normalize(raw)?;
    Ok(match expected_columns {
        Some(expected) => align_expected(&normalized, expected),
        None => normalized,
    })
}

/// Resolve canonical fields and pass through everything else.
pub fn normalize(raw: &FeatureRecord) -> Result<FeatureRecord, InputError> {
    let mut record = FeatureRecord::new();

    for rule in RECONCILIATION_TABLE {
        let value = match first_present(raw, rule) {
            Some((key, value)) => convert(rule, key, value)?,
            None => FeatureValue::Missing,
        };
        record.set(rule.canonical, value);
    }

    for (key, value) in raw.iter() {
        if !is_consumed(key) {
            record.set(key, value.clone());
        }
    }

    Ok(record)
}

/// Lay out a normalized record for a model artifact.
///
/// Canonical fields keep their table position, followed by the pass-through
/// columns the artifact does not name, in input order. Every remaining
/// expected column comes last, in the artifact's order:
///
/// - an accepted request key of a canonical field (`N` for an artifact
///   trained on short keys) carries that field's resolved value
/// - any other column keeps its pass-through value, or is `Missing`
pub fn align_expected(normalized: &FeatureRecord, expected_columns: &[String]) -> FeatureRecord {
    let is_expected = |column: &str| expected_columns.iter().any(|c| c == column);
    let mut record = FeatureRecord::new();

    for (column, value) in normalized.iter() {
        if is_canonical(column) || !is_expected(column) {
            record.set(column, value.clone());
        }
    }

    for column in expected_columns {
        if record.contains(column) {
            continue;
        }
        let source = canonical_for_alias(column).unwrap_or(column.as_str());
        let value = normalized
            .get(source)
            .cloned()
            .unwrap_or(FeatureValue::Missing);
        record.set(column, value);
    }

    record
}

/// True when some accepted key for `canonical` carries a usable value.
pub fn is_resolved(raw: &FeatureRecord, canonical: &str) -> bool {
    RECONCILIATION_TABLE
        .iter()
        .find(|rule| rule.canonical == canonical)
        .is_some_and(|rule| first_present(raw, rule).is_some())
}

fn first_present<'a>(
    raw: &'a FeatureRecord,
    rule: &FieldRule,
) -> Option<(&'static str, &'a FeatureValue)> {
    rule.sources.iter().find_map(|&key| {
        raw.get(key)
            .filter(|value| !is_blank(value))
            .map(|value| (key, value))
    })
}

fn is_canonical(column: &str) -> bool {
    RECONCILIATION_TABLE.iter().any(|rule| rule.canonical == column)
}

/// Canonical field that accepts `key` as a request alias.
fn canonical_for_alias(key: &str) -> Option<&'static str> {
    RECONCILIATION_TABLE
        .iter()
        .find(|rule| rule.canonical != key && rule.sources.contains(&key))
        .map(|rule| rule.canonical)
}

fn is_consumed(key: &str) -> bool {
    RECONCILIATION_TABLE
        .iter()
        .any(|rule| rule.canonical == key || rule.sources.contains(&key))
}

fn is_blank(value: &FeatureValue) -> bool {
    match value {
        FeatureValue::Missing => true,
        FeatureValue::Text(s) => s.trim().is_empty(),
        FeatureValue::Number(_) => false,
    }
}

fn convert(rule: &FieldRule, key: &str, value: &FeatureValue) -> Result<FeatureValue, InputError> {
    match rule.kind {
        FieldKind::Numeric => to_number(key, value).map(FeatureValue::Number),
        FieldKind::Categorical => Ok(match value {
            FeatureValue::Number(v) => FeatureValue::Text(format!("{v}")),
            other => other.clone(),
        }),
    }
}

fn to_number(key: &str, value: &FeatureValue) -> Result<f64, InputError> {
    let parsed = match value {
        FeatureValue::Number(v) => Some(*v),
        FeatureValue::Text(s) => s.trim().parse::<f64>().ok(),
        FeatureValue::Missing => None,
    };
    match parsed {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(InputError::InvalidNumber {
            field: key.to_string(),
            value: match value {
                FeatureValue::Text(s) => s.clone(),
                FeatureValue::Number(v) => v.to_string(),
                FeatureValue::Missing => "null".to_string(),
            },
        }),
    }
}
