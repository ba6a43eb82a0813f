//! Shared data structures for the recommendation pipeline
//!
//! - `SoilSample` / `FeatureRecord`: reconciled request data
//! - `PredictionCandidate`, `Classification`: classifier and fallback output
//! - `FertilizerAdvice`: rule engine output

mod sample;
mod prediction;
mod fertilizer;

pub use sample::*;
pub use prediction::*;
pub use fertilizer::*;
