//! Field Store
//!
//! Sled-backed persistence for zone enrichment, the recommendation audit log
//! and device readings. One tree per concern:
//!
//! | tree              | key                                  | value               |
//! |-------------------|--------------------------------------|---------------------|
//! | `zones`           | lowercased state name                | zone name (UTF-8)   |
//! | `predictions`     | `{timestamp_ms:be64}{sequence:be64}` | `PredictionRecord`  |
//! | `sensor_readings` | `{timestamp_ms:be64}{sequence:be64}` | `SensorReading`     |
//!
//! Big-endian timestamp keys keep both logs in chronological order, so the
//! newest entry is always `tree.last()` and a time window is a key range.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sled::{Db, Tree};
use std::path::Path;
use tracing::{debug, info};

use super::persistence::{
    zone_key, AuditSink, PersistenceError, PredictionRecord, SensorLog, SensorReading, ZoneLookup,
};

const ZONES_TREE: &str = "zones";
const PREDICTIONS_TREE: &str = "predictions";
const SENSOR_TREE: &str = "sensor_readings";

impl From<sled::Error> for PersistenceError {
    fn from(err: sled::Error) -> Self {
        PersistenceError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

/// Sled database with the three service trees.
#[derive(Clone)]
pub struct FieldStore {
    db: Db,
    zones: Tree,
    predictions: Tree,
    readings: Tree,
}

impl FieldStore {
    /// Open or create the store at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
        }
        let db = sled::open(path_ref).context("Failed to open sled database")?;
        let store = Self::from_db(db)?;

        info!(path = %path_ref.display(), zones = store.zones.len(), "Field store opened");
        Ok(store)
    }

    /// Open a throwaway database removed on drop.
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .context("Failed to open temporary sled database")?;
        Self::from_db(db)
    }

    fn from_db(db: Db) -> Result<Self> {
        Ok(Self {
            zones: db.open_tree(ZONES_TREE).context("Failed to open zones tree")?,
            predictions: db
                .open_tree(PREDICTIONS_TREE)
                .context("Failed to open predictions tree")?,
            readings: db
                .open_tree(SENSOR_TREE)
                .context("Failed to open sensor_readings tree")?,
            db,
        })
    }

    /// Insert or replace the zone for a state.
    pub fn put_zone(&self, state: &str, zone: &str) -> Result<(), PersistenceError> {
        self.zones.insert(zone_key(state).as_bytes(), zone.as_bytes())?;
        Ok(())
    }

    /// Bulk insert `(state, zone)` pairs. Returns the number written.
    pub fn seed_zones<'a>(
        &self,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<usize, PersistenceError> {
        let mut batch = sled::Batch::default();
        let mut count = 0;
        for (state, zone) in pairs {
            batch.insert(zone_key(state).as_bytes(), zone.as_bytes());
            count += 1;
        }
        self.zones.apply_batch(batch)?;
        Ok(count)
    }

    pub fn zone_count(&self) -> usize {
        self.zones.len()
    }

    /// Audit records, newest first.
    pub fn recent_predictions(
        &self,
        limit: usize,
    ) -> Result<Vec<PredictionRecord>, PersistenceError> {
        let mut out = Vec::with_capacity(limit.min(64));
        for entry in self.predictions.iter().rev().take(limit) {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    pub fn prediction_count(&self) -> usize {
        self.predictions.len()
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), PersistenceError> {
        self.db.flush()?;
        Ok(())
    }

    fn log_key(&self, timestamp: &DateTime<Utc>) -> Result<[u8; 16], PersistenceError> {
        let sequence = self.db.generate_id()?;
        let mut key = [0u8; 16];
        key[..8].copy_from_slice(&millis_prefix(timestamp));
        key[8..].copy_from_slice(&sequence.to_be_bytes());
        Ok(key)
    }
}

fn millis_prefix(timestamp: &DateTime<Utc>) -> [u8; 8] {
    (timestamp.timestamp_millis().max(0) as u64).to_be_bytes()
}

impl ZoneLookup for FieldStore {
    fn lookup_zone(&self, state: &str) -> Result<Option<String>, PersistenceError> {
        let Some(value) = self.zones.get(zone_key(state).as_bytes())? else {
            return Ok(None);
        };
        String::from_utf8(value.to_vec())
            .map(Some)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))
    }

    fn zone_table(&self) -> Result<Vec<(String, String)>, PersistenceError> {
        let utf8 = |bytes: &[u8]| {
            String::from_utf8(bytes.to_vec())
                .map_err(|e| PersistenceError::Serialization(e.to_string()))
        };
        let mut table = Vec::with_capacity(self.zones.len());
        for entry in self.zones.iter() {
            let (state, zone) = entry?;
            table.push((utf8(&state[..])?, utf8(&zone[..])?));
        }
        Ok(table)
    }
}

impl AuditSink for FieldStore {
    fn record_prediction(&self, record: &PredictionRecord) -> Result<(), PersistenceError> {
        let key = self.log_key(&record.timestamp)?;
        let value = serde_json::to_vec(record)?;
        self.predictions.insert(key, value)?;

        debug!(
            provenance = %record.provenance,
            crops = record.crops.len(),
            "Stored recommendation audit record"
        );
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

impl SensorLog for FieldStore {
    fn store_reading(&self, reading: &SensorReading) -> Result<(), PersistenceError> {
        let key = self.log_key(&reading.timestamp)?;
        let value = serde_json::to_vec(reading)?;
        self.readings.insert(key, value)?;

        debug!(device_id = %reading.device_id, "Stored sensor reading");
        Ok(())
    }

    fn latest_reading(&self) -> Result<Option<SensorReading>, PersistenceError> {
        match self.readings.last()? {
            Some((_, value)) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    fn readings_since(
        &self,
        since: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>, PersistenceError> {
        let mut out = Vec::new();
        for entry in self.readings.range(millis_prefix(&since)..) {
            let (_, value) = entry?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }
}
