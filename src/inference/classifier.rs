//! Classification Stage
//!
//! Runs the trained classifier and ranks crops by probability. Returns a
//! typed outcome; the pipeline decides the degrade-to-fallback policy.

use tracing::debug;

use super::artifacts::InferenceError;
use super::reconciler;
use super::registry::ModelBundle;
use crate::types::{PredictionCandidate, SoilSample};

/// Candidates below this probability are noise and never surfaced.
pub const MIN_PROBABILITY: f64 = crate::config::defaults::DEFAULT_MIN_PROBABILITY;

/// Result of one classification attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Ranked model output, sorted descending by probability
    Ranked(Vec<PredictionCandidate>),
    /// All-zero reading; no prediction may be made
    SensorFault,
    /// Model absent or inference failed
    Failed(InferenceError),
}

/// Classification stage settings.
#[derive(Debug, Clone, Copy)]
pub struct ClassificationStage {
    min_probability: f64,
}

impl Default for ClassificationStage {
    fn default() -> Self {
        Self::new(MIN_PROBABILITY)
    }
}

impl ClassificationStage {
    pub fn new(min_probability: f64) -> Self {
        Self { min_probability }
    }

    /// Classify a sample.
    ///
    /// 1. All-zero reading → `SensorFault`
    /// 2. Reconcile against the classifier preprocessor's expected columns
    /// 3. Transform, `predict_proba`, stable sort descending (ties keep the
    ///    model's native class order), keep `top_n`, drop < `min_probability`
    pub fn run(&self, bundle: &ModelBundle, sample: &SoilSample, top_n: usize) -> StageOutcome {
        if sample.is_zero_reading() {
            return StageOutcome::SensorFault;
        }
        match self.rank(bundle, sample, top_n) {
            Ok(candidates) => StageOutcome::Ranked(candidates),
            Err(e) => StageOutcome::Failed(e),
        }
    }

    fn rank(
        &self,
        bundle: &ModelBundle,
        sample: &SoilSample,
        top_n: usize,
    ) -> Result<Vec<PredictionCandidate>, InferenceError> {
        let (Some(classifier), Some(preprocessor)) =
            (&bundle.classifier, &bundle.classifier_preprocessor)
        else {
            return Err(InferenceError::ModelUnavailable("classifier"));
        };

        let expected = preprocessor.expected_columns();
        let record = reconciler::reconcile(&sample.to_record(), expected.as_deref())
            .map_err(|e| InferenceError::Transform(e.to_string()))?;
        let features = preprocessor.transform(&record)?;
        let probabilities = classifier.predict_proba(&features)?;

        let classes = classifier.classes();
        if probabilities.len() != classes.len() {
            return Err(InferenceError::ShapeMismatch {
                expected: classes.len(),
                actual: probabilities.len(),
            });
        }

        Ok(select_top(classes, &probabilities, top_n, self.min_probability))
    }
}

/// Rank classes by probability and keep the confident head.
///
/// `sort_by` is stable, so equal probabilities keep the class order.
pub fn select_top(
    classes: &[String],
    probabilities: &[f64],
    top_n: usize,
    min_probability: f64,
) -> Vec<PredictionCandidate> {
    let mut ranked: Vec<(usize, f64)> = probabilities
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, p)| p.is_finite())
        .collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let selected: Vec<PredictionCandidate> = ranked
        .into_iter()
        .take(top_n)
        .filter(|(_, p)| *p >= min_probability)
        .map(|(i, p)| PredictionCandidate::new(classes[i].clone(), p.clamp(0.0, 1.0)))
        .collect();

    debug!(
        selected = selected.len(),
        top = selected.first().map(|c| c.crop.as_str()).unwrap_or("-"),
        "Ranked classifier output"
    );
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::artifacts::{
        CategoricalTransform, ClassifierArtifact, CropClassifier, NumericTransform, Preprocess,
        Preprocessor,
    };
    use std::sync::Arc;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    /// Classifier returning a fixed distribution, for ordering tests.
    struct FixedClassifier {
        classes: Vec<String>,
        probabilities: Vec<f64>,
    }

    impl CropClassifier for FixedClassifier {
        fn classes(&self) -> &[String] {
            &self.classes
        }
        fn predict_proba(&self, _features: &[f64]) -> Result<Vec<f64>, InferenceError> {
            Ok(self.probabilities.clone())
        }
    }

    fn rainfall_preprocessor() -> Preprocessor {
        Preprocessor {
            feature_names_in: Some(names(&["avg_rainfall", "state", "crop_year"])),
            numeric: vec![NumericTransform {
                column: "avg_rainfall".to_string(),
                impute: 100.0,
                center: 0.0,
                scale: 1.0,
            }],
            categorical: vec![CategoricalTransform {
                column: "crop_year".to_string(),
                categories: names(&["2019", "2020"]),
            }],
        }
    }

    fn bundle_with(classifier: Arc<dyn CropClassifier>) -> ModelBundle {
        let preprocessor: Arc<dyn Preprocess> = Arc::new(rainfall_preprocessor());
        ModelBundle::empty().with_classifier(classifier, preprocessor)
    }

    fn sample() -> SoilSample {
        SoilSample {
            nitrogen: Some(90.0),
            rainfall: Some(210.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_select_top_sorted_and_truncated() {
        let classes = names(&["a", "b", "c", "d"]);
        let out = select_top(&classes, &[0.1, 0.5, 0.3, 0.1], 3, MIN_PROBABILITY);
        let crops: Vec<&str> = out.iter().map(|c| c.crop.as_str()).collect();
        assert_eq!(crops, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_ties_keep_native_class_order() {
        let classes = names(&["maize", "rice", "jute"]);
        let out = select_top(&classes, &[0.3, 0.3, 0.4], 3, MIN_PROBABILITY);
        let crops: Vec<&str> = out.iter().map(|c| c.crop.as_str()).collect();
        assert_eq!(crops, vec!["jute", "maize", "rice"]);
    }

    #[test]
    fn test_low_confidence_filtered() {
        let classes = names(&["a", "b", "c"]);
        let out = select_top(&classes, &[0.995, 0.004, 0.001], 3, MIN_PROBABILITY);
        assert_eq!(out.len(), 1);
        assert!(out.iter().all(|c| c.probability >= MIN_PROBABILITY));
    }

    #[test]
    fn test_zero_reading_is_sensor_fault() {
        let zero = SoilSample {
            nitrogen: Some(0.0),
            phosphorus: Some(0.0),
            potassium: Some(0.0),
            ph: Some(0.0),
            temperature: Some(0.0),
            humidity: Some(0.0),
            rainfall: Some(0.0),
            ..Default::default()
        };
        let bundle = bundle_with(Arc::new(FixedClassifier {
            classes: names(&["rice"]),
            probabilities: vec![1.0],
        }));
        assert_eq!(
            ClassificationStage::default().run(&bundle, &zero, 3),
            StageOutcome::SensorFault
        );
    }

    #[test]
    fn test_missing_model_is_unavailable() {
        let outcome = ClassificationStage::default().run(&ModelBundle::empty(), &sample(), 3);
        assert_eq!(
            outcome,
            StageOutcome::Failed(InferenceError::ModelUnavailable("classifier"))
        );
    }

    #[test]
    fn test_expected_columns_are_padded_before_transform() {
        // "crop_year" is not a soil field; without padding the transform fails.
        let bundle = bundle_with(Arc::new(FixedClassifier {
            classes: names(&["rice", "jute"]),
            probabilities: vec![0.7, 0.3],
        }));
        match ClassificationStage::default().run(&bundle, &sample(), 3) {
            StageOutcome::Ranked(c) => assert_eq!(c[0].crop, "rice"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn test_shape_mismatch_is_reported() {
        let forest = ClassifierArtifact::Forest {
            classes: names(&["rice"]),
            n_features: 9,
            trees: Vec::new(),
        };
        let bundle = bundle_with(Arc::new(forest));
        assert!(matches!(
            ClassificationStage::default().run(&bundle, &sample(), 3),
            StageOutcome::Failed(InferenceError::ShapeMismatch { expected: 9, .. })
        ));
    }
}
