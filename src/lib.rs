//! Mitti Mitra: Crop and Fertilizer Recommendation
//!
//! Turns partial soil and weather readings into ranked crop candidates,
//! per-crop yield estimates and rule-based fertilizer advice.
//!
//! ## Architecture
//!
//! - **Inference**: key reconciliation, model registry, classification with
//!   a heuristic fallback, per-candidate yield regression
//! - **Fertilizer**: deterministic N/P/K/pH threshold rules
//! - **Storage**: sled-backed zone lookup, audit log and sensor readings
//! - **Weather**: fills missing climate readings before inference
//! - **API**: axum routes over the pipeline

pub mod api;
pub mod config;
pub mod fertilizer;
pub mod inference;
pub mod storage;
pub mod types;
pub mod weather;

// Re-export configuration
pub use config::AdvisorConfig;

// Re-export the pipeline surface
pub use inference::{
    ArtifactPaths, FallbackPredictor, InputError, ModelBundle, ModelRegistry, PipelineSettings,
    Recommendation, RecommendationPipeline,
};

// Re-export commonly used types
pub use types::{
    Classification, FeatureRecord, FeatureValue, FertilizerAdvice, PredictionCandidate,
    Provenance, SoilSample, YieldStatus,
};

// Re-export storage
pub use storage::{FieldStore, InMemoryStore, PersistenceError};
