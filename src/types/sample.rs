//! Soil sample value object and the ordered feature records fed to model artifacts.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde::Deserialize;

// ============================================================================
// Feature Values
// ============================================================================

/// A single cell of a feature record.
///
/// `Missing` is the missing-value sentinel. It is never collapsed into `0.0`
/// so that a disconnected sensor cannot masquerade as a real zero reading.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Number(f64),
    Text(String),
    Missing,
}

impl FeatureValue {
    /// Convert an arbitrary JSON value into a feature cell without losing information.
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Missing,
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Missing, Self::Number),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            serde_json::Value::Bool(b) => Self::Text(b.to_string()),
            other => Self::Text(other.to_string()),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl Serialize for FeatureValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Number(v) if v.is_finite() => serializer.serialize_f64(*v),
            Self::Number(_) | Self::Missing => serializer.serialize_none(),
            Self::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Option<f64>> for FeatureValue {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Self::Missing, Self::Number)
    }
}

// ============================================================================
// Feature Record
// ============================================================================

/// Column-ordered record, the tabular row handed to a preprocessor.
///
/// Column order is insertion order. Setting an existing column replaces the
/// value in place and keeps its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureRecord {
    columns: Vec<(String, FeatureValue)>,
}

impl FeatureRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a record from a JSON object, preserving the object's key order.
    pub fn from_json_map(map: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut record = Self::new();
        for (key, value) in map {
            record.set(key, FeatureValue::from_json(value));
        }
        record
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// True when the column exists and carries a non-missing value.
    pub fn is_present(&self, column: &str) -> bool {
        self.get(column).is_some_and(|v| !v.is_missing())
    }

    pub fn set(&mut self, column: &str, value: impl Into<FeatureValue>) {
        let value = value.into();
        if let Some(slot) = self.columns.iter_mut().find(|(name, _)| name == column) {
            slot.1 = value;
        } else {
            self.columns.push((column.to_string(), value));
        }
    }

    pub fn number(&self, column: &str) -> Option<f64> {
        self.get(column).and_then(FeatureValue::as_number)
    }

    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(FeatureValue::as_text)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.columns.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

impl Serialize for FeatureRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (name, value) in &self.columns {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

// ============================================================================
// Soil Sample
// ============================================================================

/// Canonical column names shared by the reconciler and the sample view.
pub mod columns {
    pub const NITROGEN: &str = "soil_n";
    pub const PHOSPHORUS: &str = "soil_p";
    pub const POTASSIUM: &str = "soil_k";
    pub const PH: &str = "soil_ph";
    pub const TEMPERATURE: &str = "avg_temperature";
    pub const HUMIDITY: &str = "humidity";
    pub const RAINFALL: &str = "avg_rainfall";
    pub const STATE: &str = "state";
    pub const DISTRICT: &str = "district";
    pub const ZONE: &str = "agro_climatic_zone";
    pub const SEASON: &str = "season";
    pub const CROP_TYPE: &str = "crop_type";
    /// Injected by the yield cascade for each candidate.
    pub const CROP: &str = "crop";
}

/// One soil/weather measurement, built once per request and never mutated.
///
/// Numeric readings are `None` when the caller did not supply them. There is
/// no enforced range; agronomic plausibility is advisory only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SoilSample {
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub potassium: Option<f64>,
    pub ph: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub rainfall: Option<f64>,
    pub state: Option<String>,
    pub district: Option<String>,
    pub agro_climatic_zone: Option<String>,
    pub season: Option<String>,
    pub crop_type: Option<String>,
}

impl SoilSample {
    /// View a reconciled record as a typed sample.
    pub fn from_record(record: &FeatureRecord) -> Self {
        let text = |column: &str| record.text(column).map(str::to_string);
        Self {
            nitrogen: record.number(columns::NITROGEN),
            phosphorus: record.number(columns::PHOSPHORUS),
            potassium: record.number(columns::POTASSIUM),
            ph: record.number(columns::PH),
            temperature: record.number(columns::TEMPERATURE),
            humidity: record.number(columns::HUMIDITY),
            rainfall: record.number(columns::RAINFALL),
            state: text(columns::STATE),
            district: text(columns::DISTRICT),
            agro_climatic_zone: text(columns::ZONE),
            season: text(columns::SEASON),
            crop_type: text(columns::CROP_TYPE),
        }
    }

    /// Canonical record for this sample, in reconciliation-table order.
    pub fn to_record(&self) -> FeatureRecord {
        let mut record = FeatureRecord::new();
        record.set(columns::NITROGEN, self.nitrogen);
        record.set(columns::PHOSPHORUS, self.phosphorus);
        record.set(columns::POTASSIUM, self.potassium);
        record.set(columns::PH, self.ph);
        record.set(columns::TEMPERATURE, self.temperature);
        record.set(columns::RAINFALL, self.rainfall);
        record.set(columns::HUMIDITY, self.humidity);
        for (column, value) in [
            (columns::STATE, &self.state),
            (columns::DISTRICT, &self.district),
            (columns::ZONE, &self.agro_climatic_zone),
            (columns::SEASON, &self.season),
            (columns::CROP_TYPE, &self.crop_type),
        ] {
            let cell = value.clone().map_or(FeatureValue::Missing, FeatureValue::Text);
            record.set(column, cell);
        }
        record
    }

    /// The seven numeric readings in a fixed order.
    pub fn numeric_readings(&self) -> [Option<f64>; 7] {
        [
            self.nitrogen,
            self.phosphorus,
            self.potassium,
            self.ph,
            self.temperature,
            self.humidity,
            self.rainfall,
        ]
    }

    /// All supplied numeric readings are exactly zero.
    ///
    /// A zero vector is indistinguishable from a disconnected sensor array.
    /// At least one reading must be present for the check to fire.
    pub fn is_zero_reading(&self) -> bool {
        let present: Vec<f64> = self.numeric_readings().into_iter().flatten().collect();
        !present.is_empty() && present.iter().all(|v| *v == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_replaces_in_place() {
        let mut record = FeatureRecord::new();
        record.set("a", 1.0);
        record.set("b", "x");
        record.set("a", 2.0);

        let names: Vec<&str> = record.column_names().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(record.number("a"), Some(2.0));
    }

    #[test]
    fn test_missing_serializes_as_null() {
        let mut record = FeatureRecord::new();
        record.set("soil_n", 30.0);
        record.set("state", FeatureValue::Missing);

        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"soil_n":30.0,"state":null}"#);
    }

    #[test]
    fn test_zero_reading_detection() {
        let zero = SoilSample {
            nitrogen: Some(0.0),
            phosphorus: Some(0.0),
            potassium: Some(0.0),
            ph: Some(0.0),
            temperature: Some(0.0),
            humidity: Some(0.0),
            rainfall: Some(0.0),
            ..Default::default()
        };
        assert!(zero.is_zero_reading());

        let partial = SoilSample {
            nitrogen: Some(0.0),
            ph: Some(6.5),
            ..Default::default()
        };
        assert!(!partial.is_zero_reading());

        assert!(!SoilSample::default().is_zero_reading());
    }

    #[test]
    fn test_sample_record_round_trip() {
        let sample = SoilSample {
            nitrogen: Some(30.0),
            state: Some("Telangana".to_string()),
            ..Default::default()
        };
        let record = sample.to_record();
        assert_eq!(record.len(), 12);
        assert_eq!(SoilSample::from_record(&record), sample);
    }
}
