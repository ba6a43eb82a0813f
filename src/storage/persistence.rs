//! Persistence seams used by the pipeline and the HTTP layer
//!
//! - `ZoneLookup`: state → agro-climatic zone enrichment
//! - `AuditSink`: append-only log of served recommendations
//! - `SensorLog`: device reading ingest, latest reading and windowed history
//!
//! `FieldStore` (sled) implements all three for deployments;
//! `InMemoryStore` implements them for tests and storage-less runs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::{FertilizerAdvice, PredictionCandidate, Provenance};

/// Zone enrichment source.
///
/// A lookup error is treated by the pipeline as "no zone"; it never fails a
/// request.
pub trait ZoneLookup: Send + Sync {
    fn lookup_zone(&self, state: &str) -> Result<Option<String>, PersistenceError>;

    /// Every `(state key, zone)` pair, ordered by state key.
    fn zone_table(&self) -> Result<Vec<(String, String)>, PersistenceError>;
}

/// Recommendation audit log.
pub trait AuditSink: Send + Sync {
    fn record_prediction(&self, record: &PredictionRecord) -> Result<(), PersistenceError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Device reading store.
pub trait SensorLog: Send + Sync {
    fn store_reading(&self, reading: &SensorReading) -> Result<(), PersistenceError>;

    /// Reading with the newest timestamp
    fn latest_reading(&self) -> Result<Option<SensorReading>, PersistenceError>;

    /// Readings stamped at or after `since`, oldest first.
    fn readings_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, PersistenceError>;
}

/// Persistence errors
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

/// One served recommendation, as written to the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub timestamp: DateTime<Utc>,
    pub provenance: Provenance,
    pub crops: Vec<PredictionCandidate>,
    pub predicted_yield: Option<Vec<f64>>,
    pub fertilizer_recommendations: Vec<FertilizerAdvice>,
    /// Reconciled request echo
    pub used_params: serde_json::Value,
}

fn default_device_id() -> String {
    "pi_01".to_string()
}

/// Field device measurement pushed to the ingest endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default = "default_device_id")]
    pub device_id: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub nitrogen: Option<f64>,
    #[serde(default)]
    pub phosphorus: Option<f64>,
    #[serde(default)]
    pub potassium: Option<f64>,
    #[serde(default)]
    pub rainfall: f64,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

/// Per-field means over a set of readings.
///
/// A field no reading carries averages to `None`. Rainfall is always present
/// on a reading, so it is `None` only for an empty set.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SensorSummary {
    pub reading_count: usize,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub ph: Option<f64>,
    pub nitrogen: Option<f64>,
    pub phosphorus: Option<f64>,
    pub potassium: Option<f64>,
    pub rainfall: Option<f64>,
}

impl SensorSummary {
    pub fn from_readings(readings: &[SensorReading]) -> Self {
        fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
            let (sum, count) = values
                .filter(|v| v.is_finite())
                .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
            (count > 0).then(|| sum / count as f64)
        }

        Self {
            reading_count: readings.len(),
            temperature: mean(readings.iter().filter_map(|r| r.temperature)),
            humidity: mean(readings.iter().filter_map(|r| r.humidity)),
            ph: mean(readings.iter().filter_map(|r| r.ph)),
            nitrogen: mean(readings.iter().filter_map(|r| r.nitrogen)),
            phosphorus: mean(readings.iter().filter_map(|r| r.phosphorus)),
            potassium: mean(readings.iter().filter_map(|r| r.potassium)),
            rainfall: mean(readings.iter().map(|r| r.rainfall)),
        }
    }
}

/// Lowercased, trimmed state name used as the zone key.
pub fn zone_key(state: &str) -> String {
    state.trim().to_lowercase()
}

/// In-memory store for tests and storage-less deployments
///
/// Thread-safe via `RwLock`. Not durable; data is lost on restart.
pub struct InMemoryStore {
    zones: RwLock<HashMap<String, String>>,
    predictions: RwLock<Vec<PredictionRecord>>,
    readings: RwLock<Vec<SensorReading>>,
    max_predictions: usize,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            zones: RwLock::new(HashMap::new()),
            predictions: RwLock::new(Vec::new()),
            readings: RwLock::new(Vec::new()),
            max_predictions: 1000,
        }
    }

    /// Store preloaded with `(state, zone)` pairs.
    pub fn with_zones<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let store = Self::new();
        if let Ok(mut zones) = store.zones.write() {
            for (state, zone) in pairs {
                zones.insert(zone_key(state), zone.to_string());
            }
        }
        store
    }

    /// Audit records, oldest first.
    pub fn predictions(&self) -> Vec<PredictionRecord> {
        self.predictions
            .read()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneLookup for InMemoryStore {
    fn lookup_zone(&self, state: &str) -> Result<Option<String>, PersistenceError> {
        let zones = self
            .zones
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(zones.get(&zone_key(state)).cloned())
    }

    fn zone_table(&self) -> Result<Vec<(String, String)>, PersistenceError> {
        let zones = self
            .zones
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let mut table: Vec<(String, String)> =
            zones.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        table.sort();
        Ok(table)
    }
}

impl AuditSink for InMemoryStore {
    fn record_prediction(&self, record: &PredictionRecord) -> Result<(), PersistenceError> {
        let mut store = self
            .predictions
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;

        store.push(record.clone());

        // Evict oldest if over limit
        if store.len() > self.max_predictions {
            store.remove(0);
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "InMemory"
    }
}

impl SensorLog for InMemoryStore {
    fn store_reading(&self, reading: &SensorReading) -> Result<(), PersistenceError> {
        self.readings
            .write()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?
            .push(reading.clone());
        Ok(())
    }

    fn latest_reading(&self) -> Result<Option<SensorReading>, PersistenceError> {
        let readings = self
            .readings
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        Ok(readings.iter().max_by_key(|r| r.timestamp).cloned())
    }

    fn readings_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, PersistenceError> {
        let readings = self
            .readings
            .read()
            .map_err(|e| PersistenceError::Storage(e.to_string()))?;
        let mut window: Vec<SensorReading> = readings
            .iter()
            .filter(|r| r.timestamp >= since)
            .cloned()
            .collect();
        window.sort_by_key(|r| r.timestamp);
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn reading(device: &str, hour: u32) -> SensorReading {
        SensorReading {
            device_id: device.to_string(),
            temperature: Some(26.5),
            humidity: None,
            ph: Some(6.8),
            nitrogen: Some(120.0),
            phosphorus: None,
            potassium: None,
            rainfall: 0.0,
            timestamp: Utc.with_ymd_and_hms(2024, 6, 1, hour, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_zone_lookup_is_case_insensitive() {
        let store = InMemoryStore::with_zones([("Telangana", "Southern Plateau and Hills")]);
        assert_eq!(
            store.lookup_zone(" telangana ").unwrap().as_deref(),
            Some("Southern Plateau and Hills")
        );
        assert!(store.lookup_zone("Kerala").unwrap().is_none());
    }

    #[test]
    fn test_latest_reading_by_timestamp() {
        let store = InMemoryStore::new();
        assert!(store.latest_reading().unwrap().is_none());

        store.store_reading(&reading("pi_02", 9)).unwrap();
        store.store_reading(&reading("pi_01", 7)).unwrap();
        assert_eq!(store.latest_reading().unwrap().unwrap().device_id, "pi_02");
    }

    #[test]
    fn test_readings_since_filters_and_orders() {
        let store = InMemoryStore::new();
        store.store_reading(&reading("pi_03", 11)).unwrap();
        store.store_reading(&reading("pi_01", 7)).unwrap();
        store.store_reading(&reading("pi_02", 9)).unwrap();

        let since = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        let devices: Vec<String> = store
            .readings_since(since)
            .unwrap()
            .into_iter()
            .map(|r| r.device_id)
            .collect();
        assert_eq!(devices, vec!["pi_02", "pi_03"]);
    }

    #[test]
    fn test_summary_averages_present_fields_only() {
        let mut first = reading("pi_01", 7);
        first.temperature = Some(24.0);
        first.rainfall = 2.0;
        let mut second = reading("pi_01", 8);
        second.temperature = Some(30.0);
        second.nitrogen = None;

        let summary = SensorSummary::from_readings(&[first, second]);
        assert_eq!(summary.reading_count, 2);
        assert_eq!(summary.temperature, Some(27.0));
        assert_eq!(summary.nitrogen, Some(120.0));
        assert_eq!(summary.rainfall, Some(1.0));
        assert!(summary.humidity.is_none());

        assert_eq!(SensorSummary::from_readings(&[]), SensorSummary::default());
    }

    #[test]
    fn test_zone_table_sorted_by_state() {
        let store = InMemoryStore::with_zones([
            ("Punjab", "Trans-Gangetic Plains"),
            ("Kerala", "West Coast Plains and Ghats"),
        ]);
        let table = store.zone_table().unwrap();
        assert_eq!(table[0], ("kerala".to_string(), "West Coast Plains and Ghats".to_string()));
        assert_eq!(table[1].0, "punjab");
    }

    #[test]
    fn test_sensor_reading_defaults() {
        let parsed: SensorReading = serde_json::from_str(r#"{"temperature": 25.0}"#).unwrap();
        assert_eq!(parsed.device_id, "pi_01");
        assert_eq!(parsed.rainfall, 0.0);
        assert!(parsed.humidity.is_none());
    }

    #[test]
    fn test_trait_objects() {
        let store = std::sync::Arc::new(InMemoryStore::new());
        let sink: std::sync::Arc<dyn AuditSink> = store.clone();
        assert_eq!(sink.backend_name(), "InMemory");

        sink.record_prediction(&PredictionRecord {
            timestamp: Utc::now(),
            provenance: Provenance::Fallback,
            crops: vec![PredictionCandidate::new("rice", 0.9)],
            predicted_yield: None,
            fertilizer_recommendations: Vec::new(),
            used_params: serde_json::json!({"soil_n": 30.0}),
        })
        .unwrap();
        assert_eq!(store.predictions().len(), 1);
    }
}
