//! Recommendation Inference
//!
//! Turns a raw, partially specified soil/weather record into ranked crop
//! candidates with optional yield predictions.
//!
//! ## Key Features
//! - Explicit reconciliation table for heterogeneous request keys
//! - Initialize-once model registry shared through `Arc`
//! - Typed stage outcomes; the pipeline owns the degrade-to-fallback policy
//! - Seedable heuristic fallback when no classifier is available
//! - Per-candidate yield regression with isolated failures
//!
//! ## Architecture
//! - `reconciler`: request keys → canonical columns, expected-column padding
//! - `artifacts`: JSON model formats (preprocessor, forest/logistic, boosted/linear)
//! - `registry`: `ModelBundle` loading and the `OnceLock` registry
//! - `classifier`: zero-reading guard, top-N ranking
//! - `fallback`: rainfall-banded random sampler
//! - `yield_cascade`: per-candidate regression
//! - `pipeline`: orchestration, zone enrichment, audit

pub mod artifacts;
pub mod classifier;
pub mod fallback;
pub mod pipeline;
pub mod reconciler;
pub mod registry;
pub mod yield_cascade;

// Re-export public types
pub use artifacts::{CropClassifier, InferenceError, Preprocess, YieldRegressor};
pub use classifier::{ClassificationStage, StageOutcome};
pub use fallback::FallbackPredictor;
pub use pipeline::{PipelineSettings, Recommendation, RecommendationPipeline};
pub use reconciler::{reconcile, InputError};
pub use registry::{ArtifactPaths, BundleStatus, ModelBundle, ModelRegistry};
pub use yield_cascade::predict_yields;
