//! Yield Regression Cascade
//!
//! Attaches a predicted yield to each classification candidate. The regressor
//! was trained with `crop` as an input feature, so every candidate gets its
//! own feature row: the shared base record plus `crop = <name>`.
//!
//! Failures are per candidate. A candidate whose row cannot be transformed or
//! scored keeps `predicted_yield = None` and the others are unaffected. The
//! candidate list is never re-ordered, extended or shortened.

use tracing::{debug, warn};

use super::artifacts::{InferenceError, Preprocess, YieldRegressor};
use super::reconciler;
use super::registry::ModelBundle;
use crate::types::{columns, FeatureRecord, PredictionCandidate, SoilSample, YieldStatus};

/// Score every candidate with the regressor, in place.
pub fn predict_yields(
    bundle: &ModelBundle,
    sample: &SoilSample,
    candidates: &mut [PredictionCandidate],
) -> YieldStatus {
    let (Some(regressor), Some(preprocessor)) = (&bundle.regressor, &bundle.regressor_preprocessor)
    else {
        debug!("Yield regressor unavailable, skipping cascade");
        return YieldStatus::Unavailable;
    };
    if candidates.is_empty() {
        return YieldStatus::Unavailable;
    }

    let base = sample.to_record();
    let expected = preprocessor.expected_columns();
    let mut attached = 0;

    for candidate in candidates.iter_mut() {
        match score_candidate(
            regressor.as_ref(),
            preprocessor.as_ref(),
            &base,
            expected.as_deref(),
            &candidate.crop,
        ) {
            Ok(value) => {
                debug!(crop = %candidate.crop, predicted_yield = value, "Yield predicted");
                candidate.predicted_yield = Some(value);
                attached += 1;
            }
            Err(e) => {
                warn!(crop = %candidate.crop, error = %e, "Yield prediction failed for candidate");
            }
        }
    }

    YieldStatus::Predicted { attached }
}

fn score_candidate(
    regressor: &dyn YieldRegressor,
    preprocessor: &dyn Preprocess,
    base: &FeatureRecord,
    expected: Option<&[String]>,
    crop: &str,
) -> Result<f64, InferenceError> {
    let mut row = base.clone();
    row.set(columns::CROP, crop);

    let row = reconciler::reconcile(&row, expected)
        .map_err(|e| InferenceError::Transform(e.to_string()))?;
    let features = preprocessor.transform(&row)?;
    let value = regressor.predict(&features)?;

    if !value.is_finite() {
        return Err(InferenceError::Transform(format!(
            "regressor returned non-finite value {value}"
        )));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::artifacts::{CategoricalTransform, NumericTransform, Preprocessor};
    use std::sync::Arc;

    /// Yield keyed on the one-hot crop column, failing for unknown crops.
    struct CropTable;

    impl YieldRegressor for CropTable {
        fn predict(&self, features: &[f64]) -> Result<f64, InferenceError> {
            // [soil_n, crop=rice, crop=maize]
            if features[1] == 1.0 {
                Ok(4.0 + features[0] / 100.0)
            } else if features[2] == 1.0 {
                Ok(2.5)
            } else {
                Err(InferenceError::Transform("unknown crop".to_string()))
            }
        }
    }

    struct NanRegressor;

    impl YieldRegressor for NanRegressor {
        fn predict(&self, _features: &[f64]) -> Result<f64, InferenceError> {
            Ok(f64::NAN)
        }
    }

    fn preprocessor() -> Arc<dyn Preprocess> {
        Arc::new(Preprocessor {
            feature_names_in: Some(vec![
                "soil_n".to_string(),
                "crop".to_string(),
                "area_ha".to_string(),
            ]),
            numeric: vec![NumericTransform {
                column: "soil_n".to_string(),
                impute: 0.0,
                center: 0.0,
                scale: 1.0,
            }],
            categorical: vec![CategoricalTransform {
                column: "crop".to_string(),
                categories: vec!["rice".to_string(), "maize".to_string()],
            }],
        })
    }

    fn candidates(names: &[&str]) -> Vec<PredictionCandidate> {
        names
            .iter()
            .enumerate()
            .map(|(i, n)| PredictionCandidate::new(*n, 0.9 - i as f64 * 0.1))
            .collect()
    }

    fn sample() -> SoilSample {
        SoilSample {
            nitrogen: Some(50.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_unavailable_without_regressor() {
        let mut list = candidates(&["rice"]);
        let status = predict_yields(&ModelBundle::empty(), &sample(), &mut list);
        assert_eq!(status, YieldStatus::Unavailable);
        assert!(list[0].predicted_yield.is_none());
    }

    #[test]
    fn test_each_candidate_gets_its_own_row() {
        let bundle = ModelBundle::empty().with_regressor(Arc::new(CropTable), preprocessor());
        let mut list = candidates(&["rice", "maize"]);

        let status = predict_yields(&bundle, &sample(), &mut list);
        assert_eq!(status, YieldStatus::Predicted { attached: 2 });
        assert_eq!(list[0].predicted_yield, Some(4.5));
        assert_eq!(list[1].predicted_yield, Some(2.5));
    }

    #[test]
    fn test_failure_is_isolated_and_order_preserved() {
        let bundle = ModelBundle::empty().with_regressor(Arc::new(CropTable), preprocessor());
        let mut list = candidates(&["rice", "coffee", "maize"]);
        let before: Vec<String> = list.iter().map(|c| c.crop.clone()).collect();

        let status = predict_yields(&bundle, &sample(), &mut list);
        assert_eq!(status.attached(), 2);
        assert!(list[1].predicted_yield.is_none());
        assert!(list[2].predicted_yield.is_some());

        let after: Vec<String> = list.iter().map(|c| c.crop.clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_non_finite_yield_is_dropped() {
        let bundle = ModelBundle::empty().with_regressor(Arc::new(NanRegressor), preprocessor());
        let mut list = candidates(&["rice"]);
        let status = predict_yields(&bundle, &sample(), &mut list);
        assert_eq!(status, YieldStatus::Predicted { attached: 0 });
        assert!(list[0].predicted_yield.is_none());
    }

    #[test]
    fn test_empty_candidates() {
        let bundle = ModelBundle::empty().with_regressor(Arc::new(CropTable), preprocessor());
        assert_eq!(
            predict_yields(&bundle, &sample(), &mut []),
            YieldStatus::Unavailable
        );
    }
}
