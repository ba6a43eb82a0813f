//! Model artifacts exported by the offline trainer.
//!
//! Artifacts are JSON documents. The pipeline only relies on the three seam
//! traits below (`Preprocess`, `CropClassifier`, `YieldRegressor`); the
//! concrete formats are:
//!
//! - [`Preprocessor`]: numeric impute + standardize, categorical one-hot
//! - [`ClassifierArtifact`]: random-forest (leaf class distributions) or
//!   multinomial logistic
//! - [`RegressorArtifact`]: gradient-boosted trees or linear

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{FeatureRecord, FeatureValue};

/// Runtime faults raised while running an artifact.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InferenceError {
    #[error("model unavailable: {0}")]
    ModelUnavailable(&'static str),

    #[error("transform failed: {0}")]
    Transform(String),

    #[error("shape mismatch: expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },
}

// ============================================================================
// Seam Traits
// ============================================================================

/// Turns a reconciled record into the numeric vector a model consumes.
pub trait Preprocess: Send + Sync {
    /// Input columns the artifact was fitted on, when it exposes them.
    fn expected_columns(&self) -> Option<Vec<String>>;

    fn transform(&self, record: &FeatureRecord) -> Result<Vec<f64>, InferenceError>;
}

/// Multi-class crop classifier.
pub trait CropClassifier: Send + Sync {
    /// Class labels in the model's native order.
    fn classes(&self) -> &[String];

    /// One probability per class, aligned with `classes()`.
    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError>;
}

/// Scalar yield regressor.
pub trait YieldRegressor: Send + Sync {
    fn predict(&self, features: &[f64]) -> Result<f64, InferenceError>;
}

// ============================================================================
// Preprocessor
// ============================================================================

/// Column transformer: numeric columns first, then one-hot blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Preprocessor {
    /// Columns seen at fit time. Older exports omit this.
    #[serde(default)]
    pub feature_names_in: Option<Vec<String>>,
    #[serde(default)]
    pub numeric: Vec<NumericTransform>,
    #[serde(default)]
    pub categorical: Vec<CategoricalTransform>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NumericTransform {
    pub column: String,
    /// Replacement for missing values (training mean)
    #[serde(default)]
    pub impute: f64,
    #[serde(default)]
    pub center: f64,
    #[serde(default = "unit_scale")]
    pub scale: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoricalTransform {
    pub column: String,
    pub categories: Vec<String>,
}

fn unit_scale() -> f64 {
    1.0
}

fn unit_rate() -> f64 {
    1.0
}

impl Preprocessor {
    /// Width of the transformed vector.
    pub fn output_width(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|c| c.categories.len())
                .sum::<usize>()
    }

    fn cell<'a>(
        record: &'a FeatureRecord,
        column: &str,
    ) -> Result<&'a FeatureValue, InferenceError> {
        record.get(column).ok_or_else(|| {
            InferenceError::Transform(format!("column '{column}' not present in input record"))
        })
    }
}

impl Preprocess for Preprocessor {
    /// `feature_names_in` when exported, otherwise the union of the transformer
    /// column selectors, otherwise `None`.
    fn expected_columns(&self) -> Option<Vec<String>> {
        if let Some(names) = &self.feature_names_in {
            return Some(names.clone());
        }
        let mut columns: Vec<String> = Vec::new();
        let selected = self
            .numeric
            .iter()
            .map(|t| &t.column)
            .chain(self.categorical.iter().map(|t| &t.column));
        for column in selected {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        if columns.is_empty() {
            None
        } else {
            Some(columns)
        }
    }

    fn transform(&self, record: &FeatureRecord) -> Result<Vec<f64>, InferenceError> {
        let mut out = Vec::with_capacity(self.output_width());

        for t in &self.numeric {
            let raw = match Self::cell(record, &t.column)? {
                FeatureValue::Number(v) => *v,
                FeatureValue::Missing => t.impute,
                FeatureValue::Text(s) => s.trim().parse::<f64>().map_err(|_| {
                    InferenceError::Transform(format!(
                        "column '{}' expects a number, got '{s}'",
                        t.column
                    ))
                })?,
            };
            let value = if raw.is_nan() { t.impute } else { raw };
            let scale = if t.scale == 0.0 { 1.0 } else { t.scale };
            out.push((value - t.center) / scale);
        }

        for t in &self.categorical {
            let label = match Self::cell(record, &t.column)? {
                FeatureValue::Text(s) => Some(s.clone()),
                FeatureValue::Number(v) => Some(format!("{v}")),
                FeatureValue::Missing => None,
            };
            out.extend(
                t.categories
                    .iter()
                    .map(|c| if label.as_deref() == Some(c.as_str()) { 1.0 } else { 0.0 }),
            );
        }

        Ok(out)
    }
}

// ============================================================================
// Decision Trees
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        /// Direction taken when the feature is NaN
        #[serde(default)]
        missing_left: bool,
    },
    Leaf {
        value: Vec<f64>,
    },
}

/// Flat array of nodes, root at index 0. `x <= threshold` goes left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk the tree and return the leaf payload.
    pub fn evaluate(&self, features: &[f64]) -> Result<&[f64], InferenceError> {
        let mut index = 0;
        // A well-formed tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..=self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { value }) => return Ok(value),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    missing_left,
                }) => {
                    let x = *features.get(*feature).ok_or(InferenceError::ShapeMismatch {
                        expected: feature + 1,
                        actual: features.len(),
                    })?;
                    index = if x.is_nan() {
                        if *missing_left { *left } else { *right }
                    } else if x <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                None => {
                    return Err(InferenceError::Transform(format!(
                        "tree node {index} out of range"
                    )))
                }
            }
        }
        Err(InferenceError::Transform("tree contains a cycle".to_string()))
    }
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    /// Averaged per-tree class distributions
    Forest {
        classes: Vec<String>,
        n_features: usize,
        trees: Vec<DecisionTree>,
    },
    /// Softmax over one linear score per class
    Logistic {
        classes: Vec<String>,
        coefficients: Vec<Vec<f64>>,
        intercepts: Vec<f64>,
    },
}

impl ClassifierArtifact {
    /// Structural checks run once at load time.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Forest { classes, trees, .. } => {
                if classes.is_empty() {
                    return Err("forest has no classes".to_string());
                }
                if trees.is_empty() {
                    return Err("forest has no trees".to_string());
                }
                Ok(())
            }
            Self::Logistic {
                classes,
                coefficients,
                intercepts,
            } => {
                if classes.is_empty() {
                    return Err("logistic model has no classes".to_string());
                }
                if coefficients.len() != classes.len() || intercepts.len() != classes.len() {
                    return Err(format!(
                        "logistic model has {} classes but {} coefficient rows and {} intercepts",
                        classes.len(),
                        coefficients.len(),
                        intercepts.len()
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Self::Forest { n_features, .. } => *n_features,
            Self::Logistic { coefficients, .. } => coefficients.first().map_or(0, Vec::len),
        }
    }
}

impl CropClassifier for ClassifierArtifact {
    fn classes(&self) -> &[String] {
        match self {
            Self::Forest { classes, .. } | Self::Logistic { classes, .. } => classes,
        }
    }

    fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, InferenceError> {
        let expected = self.n_features();
        if features.len() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected,
                actual: features.len(),
            });
        }

        match self {
            Self::Forest { classes, trees, .. } => {
                let mut totals = vec![0.0; classes.len()];
                for tree in trees {
                    let leaf = tree.evaluate(features)?;
                    if leaf.len() != classes.len() {
                        return Err(InferenceError::Transform(format!(
                            "leaf has {} class weights, model has {} classes",
                            leaf.len(),
                            classes.len()
                        )));
                    }
                    let mass: f64 = leaf.iter().sum();
                    if mass <= 0.0 {
                        continue;
                    }
                    for (total, weight) in totals.iter_mut().zip(leaf) {
                        *total += weight / mass;
                    }
                }
                let n = trees.len() as f64;
                Ok(totals.into_iter().map(|t| t / n).collect())
            }
            Self::Logistic {
                coefficients,
                intercepts,
                ..
            } => {
                let scores: Vec<f64> = coefficients
                    .iter()
                    .zip(intercepts)
                    .map(|(row, b)| dot(row, features) + b)
                    .collect();
                Ok(softmax(&scores))
            }
        }
    }
}

// ============================================================================
// Regressor
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RegressorArtifact {
    /// `base_score + learning_rate * Σ leaf[0]`
    Boosted {
        n_features: usize,
        #[serde(default)]
        base_score: f64,
        #[serde(default = "unit_rate")]
        learning_rate: f64,
        trees: Vec<DecisionTree>,
    },
    Linear {
        coefficients: Vec<f64>,
        intercept: f64,
    },
}

impl RegressorArtifact {
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Boosted { trees, .. } if trees.is_empty() => {
                Err("boosted model has no trees".to_string())
            }
            Self::Linear { coefficients, .. } if coefficients.is_empty() => {
                Err("linear model has no coefficients".to_string())
            }
            _ => Ok(()),
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Self::Boosted { n_features, .. } => *n_features,
            Self::Linear { coefficients, .. } => coefficients.len(),
        }
    }
}

impl YieldRegressor for RegressorArtifact {
    fn predict(&self, features: &[f64]) -> Result<f64, InferenceError> {
        let expected = self.n_features();
        if features.len() != expected {
            return Err(InferenceError::ShapeMismatch {
                expected,
                actual: features.len(),
            });
        }

        match self {
            Self::Boosted {
                base_score,
                learning_rate,
                trees,
                ..
            } => {
                let mut sum = 0.0;
                for tree in trees {
                    let leaf = tree.evaluate(features)?;
                    sum += leaf.first().copied().unwrap_or(0.0);
                }
                Ok(base_score + learning_rate * sum)
            }
            Self::Linear {
                coefficients,
                intercept,
            } => Ok(dot(coefficients, features) + intercept),
        }
    }
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn softmax(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = scores.iter().map(|s| (s - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.into_iter().map(|e| e / total).collect()
}
