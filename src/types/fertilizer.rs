//! Fertilizer advisory record.

use serde::{Deserialize, Serialize};

/// What triggered an advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdviceKind {
    Deficiency,
    Excess,
    Amendment,
    #[default]
    Balanced,
}

/// One nutrient-specific recommendation.
///
/// `nutrient` is absent for the synthesized "balanced" advisory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FertilizerAdvice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nutrient: Option<String>,
    pub fertilizer: String,
    pub reason: String,
    #[serde(skip)]
    pub kind: AdviceKind,
}

impl FertilizerAdvice {
    pub fn new(
        nutrient: Option<&str>,
        fertilizer: &str,
        reason: &str,
        kind: AdviceKind,
    ) -> Self {
        Self {
            nutrient: nutrient.map(str::to_string),
            fertilizer: fertilizer.to_string(),
            reason: reason.to_string(),
            kind,
        }
    }
}
