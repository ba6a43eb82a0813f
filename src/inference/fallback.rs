//! Fallback Heuristic Predictor
//!
//! Rainfall-banded random crop sampler that keeps the endpoint responsive
//! when no trained classifier is available or inference fails. Output carries
//! the same shape as model output; the caller tags it `Provenance::Fallback`.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;
use tracing::warn;

use crate::types::PredictionCandidate;

/// Full crop catalog (labels of the crop recommendation dataset).
pub const CROP_CATALOG: [&str; 22] = [
    "rice", "maize", "chickpea", "kidneybeans", "pigeonpeas",
    "mothbeans", "mungbean", "blackgram", "lentil", "pomegranate",
    "banana", "mango", "grapes", "watermelon", "muskmelon", "apple",
    "orange", "papaya", "coconut", "cotton", "jute", "coffee",
];

/// Wet-climate pool, used above [`WET_RAINFALL_MM`].
pub const WET_CLIMATE_CROPS: [&str; 4] = ["rice", "jute", "coconut", "papaya"];

/// Arid pool, used below [`ARID_RAINFALL_MM`].
pub const ARID_CROPS: [&str; 4] = ["mothbeans", "chickpea", "lentil", "muskmelon"];

pub const WET_RAINFALL_MM: f64 = 200.0;
pub const ARID_RAINFALL_MM: f64 = 50.0;

/// Rainfall assumed when the reading is missing (mid band).
pub const DEFAULT_RAINFALL_MM: f64 = 100.0;

pub const MIN_CONFIDENCE: f64 = 0.75;
pub const MAX_CONFIDENCE: f64 = 0.98;

/// Candidate pool for a rainfall reading.
pub fn candidate_pool(rainfall: Option<f64>) -> &'static [&'static str] {
    let rainfall = rainfall.unwrap_or(DEFAULT_RAINFALL_MM);
    if rainfall > WET_RAINFALL_MM {
        &WET_CLIMATE_CROPS
    } else if rainfall < ARID_RAINFALL_MM {
        &ARID_CROPS
    } else {
        &CROP_CATALOG
    }
}

/// Sample `top_n` distinct crops and score them with a surrogate confidence.
///
/// Falls back to the full catalog when the banded pool is smaller than
/// `top_n`. Confidences lie in `[0.75, 0.98]` (two decimals) and the result
/// is sorted descending.
pub fn mock_predict<R: Rng + ?Sized>(
    top_n: usize,
    rainfall: Option<f64>,
    rng: &mut R,
) -> Vec<PredictionCandidate> {
    let banded = candidate_pool(rainfall);
    let pool: &[&str] = if banded.len() >= top_n {
        banded
    } else {
        &CROP_CATALOG
    };

    let mut candidates: Vec<PredictionCandidate> = pool
        .choose_multiple(rng, top_n)
        .map(|crop| {
            let confidence = rng.gen_range(MIN_CONFIDENCE..=MAX_CONFIDENCE);
            PredictionCandidate::new(*crop, (confidence * 100.0).round() / 100.0)
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Shared sampler with an injectable, seedable random source.
pub struct FallbackPredictor {
    rng: Mutex<StdRng>,
}

impl FallbackPredictor {
    /// Seeded sampler (deterministic sequence) or an entropy-seeded one.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64);
        Self::from_rng(rng)
    }

    pub fn from_rng(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }

    pub fn predict(&self, top_n: usize, rainfall: Option<f64>) -> Vec<PredictionCandidate> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| {
            warn!("Fallback RNG mutex poisoned, recovering");
            e.into_inner()
        });
        mock_predict(top_n, rainfall, &mut *rng)
    }
}

impl Default for FallbackPredictor {
    fn default() -> Self {
        Self::new(None)
    }
}
