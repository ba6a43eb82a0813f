//! Storage
//!
//! Zone enrichment, recommendation audit log and device readings. The
//! pipeline only sees the `ZoneLookup` and `AuditSink` traits.

pub mod field_store;
pub mod persistence;

pub use field_store::FieldStore;
pub use persistence::{
    AuditSink, InMemoryStore, PersistenceError, PredictionRecord, SensorLog, SensorReading,
    SensorSummary, ZoneLookup,
};
