//! Crop prediction types shared by the classification stage, the yield
//! cascade and the fallback sampler.

use serde::{Deserialize, Serialize};

/// One ranked crop suggestion.
///
/// `probability` is the classifier probability, or the surrogate confidence
/// score when the fallback sampler produced the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionCandidate {
    pub crop: String,
    pub probability: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predicted_yield: Option<f64>,
}

impl PredictionCandidate {
    pub fn new(crop: impl Into<String>, probability: f64) -> Self {
        Self {
            crop: crop.into(),
            probability,
            predicted_yield: None,
        }
    }
}

/// Where a candidate list came from.
///
/// Internal only: the response schema is identical for every provenance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Trained classifier output
    Model,
    /// Rainfall-banded heuristic sampler
    Fallback,
    /// All-zero reading rejected before inference
    SensorFault,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Model => write!(f, "model"),
            Self::Fallback => write!(f, "fallback"),
            Self::SensorFault => write!(f, "sensor_fault"),
        }
    }
}

/// Output of the classification stage after the fallback policy is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Sorted descending by probability
    pub candidates: Vec<PredictionCandidate>,
    pub provenance: Provenance,
}

/// Outcome of the yield cascade. "No yield" is a state, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldStatus {
    /// The cascade ran; `attached` candidates received a yield
    Predicted { attached: usize },
    /// Regressor or its preprocessor is absent, or there was nothing to score
    Unavailable,
}

impl YieldStatus {
    pub fn attached(&self) -> usize {
        match self {
            Self::Predicted { attached } => *attached,
            Self::Unavailable => 0,
        }
    }
}
