//! Fertilizer Rule Engine
//!
//! Deterministic threshold rules over N/P/K and pH. Pure: no I/O, no model
//! dependency. Two rule profiles exist and are selected by configuration.
//!
//! | rule              | standard                   | compact       |
//! |-------------------|----------------------------|---------------|
//! | N low             | N < 50 → Urea              | N < 50 → Urea |
//! | N excess          | N > 140 → caution          | -             |
//! | P low             | P < 20 → SSP or DAP        | P < 40 → DAP  |
//! | P excess          | P > 100 → caution          | -             |
//! | K low             | K < 50 → MOP               | K < 40 → MOP  |
//! | acidic            | pH < 5.5 → lime            | -             |
//! | alkaline          | pH > 8.0 → gypsum          | -             |
//! | nothing fired     | Organic compost            | NPK 10:26:26  |

use serde::{Deserialize, Serialize};

use crate::types::{AdviceKind, FertilizerAdvice};

/// Named threshold profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FertilizerProfile {
    /// Agronomic thresholds with excess and pH rules
    #[default]
    Standard,
    /// Legacy N/P/K-only thresholds
    Compact,
}

impl std::fmt::Display for FertilizerProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standard => write!(f, "standard"),
            Self::Compact => write!(f, "compact"),
        }
    }
}

impl std::str::FromStr for FertilizerProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "compact" => Ok(Self::Compact),
            other => Err(format!("unknown fertilizer profile '{other}'")),
        }
    }
}

// ============================================================================
// Thresholds
// ============================================================================

pub const NITROGEN_LOW: f64 = 50.0;
pub const NITROGEN_HIGH: f64 = 140.0;
pub const PHOSPHORUS_LOW: f64 = 20.0;
pub const PHOSPHORUS_HIGH: f64 = 100.0;
pub const POTASSIUM_LOW: f64 = 50.0;
pub const PH_ACIDIC: f64 = 5.5;
pub const PH_ALKALINE: f64 = 8.0;

pub const COMPACT_NITROGEN_LOW: f64 = 50.0;
pub const COMPACT_PHOSPHORUS_LOW: f64 = 40.0;
pub const COMPACT_POTASSIUM_LOW: f64 = 40.0;

/// Fertilizer advice with the standard profile.
///
/// Returns an empty list when N, P or K is absent. Absent pH skips the pH
/// rules only.
pub fn advise(
    nitrogen: Option<f64>,
    phosphorus: Option<f64>,
    potassium: Option<f64>,
    ph: Option<f64>,
) -> Vec<FertilizerAdvice> {
    advise_with(FertilizerProfile::Standard, nitrogen, phosphorus, potassium, ph)
}

/// Fertilizer advice with an explicit profile.
pub fn advise_with(
    profile: FertilizerProfile,
    nitrogen: Option<f64>,
    phosphorus: Option<f64>,
    potassium: Option<f64>,
    ph: Option<f64>,
) -> Vec<FertilizerAdvice> {
    let (Some(n), Some(p), Some(k)) = (
        nitrogen.filter(|v| v.is_finite()),
        phosphorus.filter(|v| v.is_finite()),
        potassium.filter(|v| v.is_finite()),
    ) else {
        return Vec::new();
    };

    let ph = ph.filter(|v| v.is_finite());
    let mut advice = match profile {
        FertilizerProfile::Standard => standard_rules(n, p, k, ph),
        FertilizerProfile::Compact => compact_rules(n, p, k),
    };

    if advice.is_empty() {
        advice.push(balanced(profile));
    }
    advice
}

fn standard_rules(n: f64, p: f64, k: f64, ph: Option<f64>) -> Vec<FertilizerAdvice> {
    let mut advice = Vec::new();

    if n < NITROGEN_LOW {
        advice.push(FertilizerAdvice::new(
            Some("Nitrogen"),
            "Urea",
            "Detected Low Nitrogen. Consider applying Urea or Ammonium Sulfate to boost leaf growth.",
            AdviceKind::Deficiency,
        ));
    } else if n > NITROGEN_HIGH {
        advice.push(FertilizerAdvice::new(
            Some("Nitrogen"),
            "Reduce nitrogen-based fertilizers",
            "Detected High Nitrogen. Reduce N-based fertilizers to prevent excessive foliage with less fruit.",
            AdviceKind::Excess,
        ));
    }

    if p < PHOSPHORUS_LOW {
        advice.push(FertilizerAdvice::new(
            Some("Phosphorus"),
            "SSP or DAP",
            "Detected Low Phosphorus. Recommended: Single Super Phosphate (SSP) or Di-ammonium Phosphate (DAP) for root strength.",
            AdviceKind::Deficiency,
        ));
    } else if p > PHOSPHORUS_HIGH {
        advice.push(FertilizerAdvice::new(
            Some("Phosphorus"),
            "Avoid phosphorus-rich fertilizers",
            "Detected High Phosphorus. Avoid P-rich fertilizers; high P can block micronutrient absorption.",
            AdviceKind::Excess,
        ));
    }

    if k < POTASSIUM_LOW {
        advice.push(FertilizerAdvice::new(
            Some("Potassium"),
            "MOP",
            "Detected Low Potassium. Recommended: Muriate of Potash (MOP) to improve disease resistance and water retention.",
            AdviceKind::Deficiency,
        ));
    }

    match ph {
        Some(v) if v < PH_ACIDIC => advice.push(FertilizerAdvice::new(
            Some("pH"),
            "Lime (Calcium Carbonate)",
            "Soil is Acidic (pH < 5.5). Apply Lime (Calcium Carbonate) to neutralize acidity.",
            AdviceKind::Amendment,
        )),
        Some(v) if v > PH_ALKALINE => advice.push(FertilizerAdvice::new(
            Some("pH"),
            "Gypsum or iron sulfate",
            "Soil is Alkaline (pH > 8.0). Apply Gypsum or iron sulfate to lower pH.",
            AdviceKind::Amendment,
        )),
        _ => {}
    }

    advice
}

fn compact_rules(n: f64, p: f64, k: f64) -> Vec<FertilizerAdvice> {
    let mut advice = Vec::new();
    if n < COMPACT_NITROGEN_LOW {
        advice.push(FertilizerAdvice::new(
            Some("Nitrogen"),
            "Urea",
            "Soil nitrogen level is low",
            AdviceKind::Deficiency,
        ));
    }
    if p < COMPACT_PHOSPHORUS_LOW {
        advice.push(FertilizerAdvice::new(
            Some("Phosphorus"),
            "DAP",
            "Soil phosphorus level is low",
            AdviceKind::Deficiency,
        ));
    }
    if k < COMPACT_POTASSIUM_LOW {
        advice.push(FertilizerAdvice::new(
            Some("Potassium"),
            "MOP",
            "Soil potassium level is low",
            AdviceKind::Deficiency,
        ));
    }
    advice
}

fn balanced(profile: FertilizerProfile) -> FertilizerAdvice {
    match profile {
        FertilizerProfile::Standard => FertilizerAdvice::new(
            None,
            "Organic compost",
            "Soil nutrient levels appear balanced. Maintain with organic compost.",
            AdviceKind::Balanced,
        ),
        FertilizerProfile::Compact => FertilizerAdvice::new(
            None,
            "NPK 10:26:26",
            "Soil nutrients are balanced",
            AdviceKind::Balanced,
        ),
    }
}
