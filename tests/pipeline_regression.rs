//! Pipeline Regression Tests
//!
//! Runs the full recommendation pipeline end to end: once with no model
//! artifacts (fallback path) and once with small hand-built JSON artifacts
//! written to a temporary model directory.

use mitti_mitra::config::defaults;
use mitti_mitra::inference::fallback::{CROP_CATALOG, WET_CLIMATE_CROPS};
use mitti_mitra::inference::{
    ArtifactPaths, FallbackPredictor, InputError, ModelBundle, ModelRegistry, PipelineSettings,
    RecommendationPipeline,
};
use mitti_mitra::storage::{AuditSink, FieldStore, InMemoryStore, ZoneLookup};
use mitti_mitra::types::{FeatureRecord, Provenance, YieldStatus};
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn record(value: serde_json::Value) -> FeatureRecord {
    match value {
        serde_json::Value::Object(map) => FeatureRecord::from_json_map(&map),
        other => panic!("test request must be an object, got {other}"),
    }
}

fn telangana_request() -> FeatureRecord {
    record(json!({
        "N": 30, "P": 35, "K": 25, "ph": 6.5,
        "temperature": 28, "humidity": 65, "rainfall": 900,
        "state": "Telangana"
    }))
}

fn fallback_pipeline(seed: u64) -> RecommendationPipeline {
    RecommendationPipeline::new(
        Arc::new(ModelRegistry::preloaded(ModelBundle::empty())),
        PipelineSettings::default(),
    )
    .with_fallback(FallbackPredictor::new(Some(seed)))
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ============================================================================
// Hand-built artifacts
// ============================================================================

/// Classifier: one tree splitting on rainfall (feature 6) at 200 mm.
/// Dry side favours maize, wet side favours rice.
fn write_artifacts(dir: &Path) {
    let classifier_preprocessor = json!({
        "feature_names_in": [
            "soil_n", "soil_p", "soil_k", "soil_ph",
            "avg_temperature", "humidity", "avg_rainfall"
        ],
        "numeric": [
            {"column": "soil_n"},
            {"column": "soil_p"},
            {"column": "soil_k"},
            {"column": "soil_ph", "impute": 6.5},
            {"column": "avg_temperature", "impute": 25.0},
            {"column": "humidity", "impute": 60.0},
            {"column": "avg_rainfall", "impute": 100.0}
        ]
    });
    let classifier = json!({
        "kind": "forest",
        "classes": ["rice", "maize", "chickpea"],
        "n_features": 7,
        "trees": [{
            "nodes": [
                {"type": "split", "feature": 6, "threshold": 200.0, "left": 1, "right": 2},
                {"type": "leaf", "value": [2.0, 12.0, 6.0]},
                {"type": "leaf", "value": [16.0, 3.0, 1.0]}
            ]
        }]
    });
    // Regressor input: soil_n, then the one-hot crop block [rice, maize].
    let regressor_preprocessor = json!({
        "numeric": [{"column": "soil_n"}],
        "categorical": [{"column": "crop", "categories": ["rice", "maize"]}]
    });
    let regressor = json!({
        "kind": "boosted",
        "n_features": 3,
        "base_score": 2.0,
        "learning_rate": 1.0,
        "trees": [{
            "nodes": [
                {"type": "split", "feature": 1, "threshold": 0.5, "left": 1, "right": 2},
                {"type": "leaf", "value": [0.5]},
                {"type": "leaf", "value": [2.0]}
            ]
        }]
    });

    for (file, body) in [
        (defaults::CLASSIFIER_PREPROCESSOR_FILE, classifier_preprocessor),
        (defaults::CLASSIFIER_FILE, classifier),
        (defaults::REGRESSOR_PREPROCESSOR_FILE, regressor_preprocessor),
        (defaults::REGRESSOR_FILE, regressor),
    ] {
        std::fs::write(dir.join(file), body.to_string()).unwrap();
    }
}

fn model_pipeline(dir: &Path) -> RecommendationPipeline {
    RecommendationPipeline::new(
        Arc::new(ModelRegistry::new(ArtifactPaths::in_dir(dir))),
        PipelineSettings::default(),
    )
}

// ============================================================================
// No models loaded
// ============================================================================

#[test]
fn telangana_request_without_models_uses_wet_climate_pool() {
    let result = fallback_pipeline(7).recommend(&telangana_request()).unwrap();

    assert_eq!(result.status, "success");
    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(result.crops.len(), 3);
    for candidate in &result.crops {
        assert!(
            WET_CLIMATE_CROPS.contains(&candidate.crop.as_str()),
            "{} is not a wet-climate crop",
            candidate.crop
        );
        assert!((0.75..=0.98).contains(&candidate.probability));
        assert!(candidate.predicted_yield.is_none());
    }
    assert!(result
        .crops
        .windows(2)
        .all(|w| w[0].probability >= w[1].probability));

    assert_eq!(result.predicted_yield, None);
    assert_eq!(result.yield_status, YieldStatus::Unavailable);

    let nitrogen = result
        .fertilizer_recommendations
        .iter()
        .find(|a| a.nutrient.as_deref() == Some("Nitrogen"))
        .expect("nitrogen deficiency advisory");
    assert_eq!(nitrogen.fertilizer, "Urea");

    assert_eq!(result.used_params.number("soil_n"), Some(30.0));
    assert_eq!(result.used_params.number("avg_rainfall"), Some(900.0));
    assert_eq!(result.used_params.text("state"), Some("Telangana"));
}

#[test]
fn telangana_response_json_shape() {
    let result = fallback_pipeline(7).recommend(&telangana_request()).unwrap();
    let body = serde_json::to_value(&result).unwrap();

    assert_eq!(body["status"], "success");
    assert!(body["predicted_yield"].is_null());
    assert_eq!(body["crops"].as_array().map(Vec::len), Some(3));
    assert_eq!(body["used_params"]["soil_ph"], 6.5);
    // Canonical fields the request omitted are reported as null.
    assert!(body["used_params"]["agro_climatic_zone"].is_null());
    assert!(body.get("provenance").is_none());
}

#[test]
fn same_seed_same_fallback_output() {
    let a = fallback_pipeline(42).recommend(&telangana_request()).unwrap();
    let b = fallback_pipeline(42).recommend(&telangana_request()).unwrap();
    assert_eq!(a.crops, b.crops);
}

#[test]
fn mid_band_rainfall_samples_full_catalog() {
    let request = record(json!({"N": 60, "P": 50, "K": 60, "rainfall": 120}));
    let result = fallback_pipeline(3).recommend(&request).unwrap();
    assert_eq!(result.crops.len(), 3);
    assert!(result
        .crops
        .iter()
        .all(|c| CROP_CATALOG.contains(&c.crop.as_str())));
}

#[test]
fn all_zero_reading_is_a_sensor_fault() {
    let request = record(json!({
        "N": 0, "P": 0, "K": 0, "ph": 0,
        "temperature": 0, "humidity": 0, "rainfall": 0
    }));
    let result = fallback_pipeline(1).recommend(&request).unwrap();

    assert_eq!(result.provenance, Provenance::SensorFault);
    assert!(result.crops.is_empty());
    assert_eq!(result.predicted_yield, None);
}

#[test]
fn non_numeric_reading_is_an_input_error() {
    let request = record(json!({"N": "plenty", "P": 35, "K": 25}));
    let err = fallback_pipeline(1).recommend(&request).unwrap_err();
    assert!(matches!(err, InputError::InvalidNumber { .. }), "{err:?}");
}

#[test]
fn empty_request_is_rejected() {
    let err = fallback_pipeline(1)
        .recommend(&FeatureRecord::new())
        .unwrap_err();
    assert_eq!(err, InputError::Empty);
}

#[test]
fn missing_npk_skips_fertilizer_rules() {
    let request = record(json!({"temperature": 30, "humidity": 70, "rainfall": 300}));
    let result = fallback_pipeline(5).recommend(&request).unwrap();
    assert!(result.fertilizer_recommendations.is_empty());
    assert_eq!(result.crops.len(), 3);
}

// ============================================================================
// Zone enrichment and audit
// ============================================================================

#[test]
fn zone_is_enriched_from_state_and_audited() {
    let store = Arc::new(InMemoryStore::with_zones([(
        "telangana",
        "Southern Plateau and Hills",
    )]));
    let pipeline = fallback_pipeline(7)
        .with_zone_lookup(Arc::clone(&store) as Arc<dyn ZoneLookup>)
        .with_audit_sink(Arc::clone(&store) as Arc<dyn AuditSink>);

    let result = pipeline.recommend(&telangana_request()).unwrap();
    assert_eq!(
        result.used_params.text("agro_climatic_zone"),
        Some("Southern Plateau and Hills")
    );

    let audit = store.predictions();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].provenance, Provenance::Fallback);
    assert_eq!(audit[0].crops, result.crops);
    assert_eq!(audit[0].used_params["state"], "Telangana");
}

#[test]
fn supplied_zone_is_not_overwritten() {
    let store = Arc::new(InMemoryStore::with_zones([("telangana", "Southern Plateau and Hills")]));
    let pipeline = fallback_pipeline(7).with_zone_lookup(store as Arc<dyn ZoneLookup>);

    let request = record(json!({
        "N": 30, "P": 35, "K": 25, "rainfall": 900,
        "state": "Telangana", "agro_climatic_zone": "Deccan"
    }));
    let result = pipeline.recommend(&request).unwrap();
    assert_eq!(result.used_params.text("agro_climatic_zone"), Some("Deccan"));
}

#[test]
fn field_store_audit_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("field.db");

    {
        let store = Arc::new(FieldStore::open(&path).unwrap());
        store.put_zone("Telangana", "Southern Plateau and Hills").unwrap();
        let pipeline = fallback_pipeline(9)
            .with_zone_lookup(Arc::clone(&store) as Arc<dyn ZoneLookup>)
            .with_audit_sink(Arc::clone(&store) as Arc<dyn AuditSink>);
        pipeline.recommend(&telangana_request()).unwrap();
        pipeline.recommend(&telangana_request()).unwrap();
        store.flush().unwrap();
    }

    let store = FieldStore::open(&path).unwrap();
    assert_eq!(store.prediction_count(), 2);
    let recent = store.recent_predictions(1).unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(
        recent[0].used_params["agro_climatic_zone"],
        "Southern Plateau and Hills"
    );
}

// ============================================================================
// Hand-built artifacts
// ============================================================================

#[test]
fn forest_classifier_and_boosted_regressor_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    let pipeline = model_pipeline(dir.path());
    let result = pipeline.recommend(&telangana_request()).unwrap();

    assert_eq!(result.provenance, Provenance::Model);
    let crops: Vec<&str> = result.crops.iter().map(|c| c.crop.as_str()).collect();
    assert_eq!(crops, vec!["rice", "maize", "chickpea"]);
    assert!(approx(result.crops[0].probability, 0.8));
    assert!(approx(result.crops[1].probability, 0.15));
    assert!(approx(result.crops[2].probability, 0.05));

    // rice: 2.0 + 2.0, others: 2.0 + 0.5
    assert_eq!(result.yield_status, YieldStatus::Predicted { attached: 3 });
    assert_eq!(result.predicted_yield, Some(vec![4.0, 2.5, 2.5]));
    assert_eq!(result.crops[0].predicted_yield, Some(4.0));
}

#[test]
fn dry_reading_ranks_maize_first() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    let request = record(json!({"N": 80, "P": 40, "K": 45, "rainfall": 90}));
    let result = model_pipeline(dir.path()).recommend(&request).unwrap();

    assert_eq!(result.provenance, Provenance::Model);
    assert_eq!(result.crops[0].crop, "maize");
    assert!(approx(result.crops[0].probability, 0.6));
}

#[test]
fn classifier_imputes_missing_climate_columns() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    // No rainfall: imputed to 100 mm, the dry branch.
    let request = record(json!({"N": 80, "P": 40, "K": 45}));
    let result = model_pipeline(dir.path()).recommend(&request).unwrap();
    assert_eq!(result.provenance, Provenance::Model);
    assert_eq!(result.crops[0].crop, "maize");
}

#[test]
fn min_probability_filters_model_candidates() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());

    let settings = PipelineSettings {
        min_probability: 0.1,
        ..PipelineSettings::default()
    };
    let pipeline = RecommendationPipeline::new(
        Arc::new(ModelRegistry::new(ArtifactPaths::in_dir(dir.path()))),
        settings,
    );
    let result = pipeline.recommend(&telangana_request()).unwrap();
    let crops: Vec<&str> = result.crops.iter().map(|c| c.crop.as_str()).collect();
    assert_eq!(crops, vec!["rice", "maize"]);
}

#[test]
fn classifier_without_regressor_gives_null_yield() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    std::fs::remove_file(dir.path().join(defaults::REGRESSOR_FILE)).unwrap();

    let result = model_pipeline(dir.path())
        .recommend(&telangana_request())
        .unwrap();
    assert_eq!(result.provenance, Provenance::Model);
    assert_eq!(result.predicted_yield, None);
    assert_eq!(result.yield_status, YieldStatus::Unavailable);
}

#[test]
fn corrupt_classifier_degrades_to_fallback() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    std::fs::write(dir.path().join(defaults::CLASSIFIER_FILE), "{ not json").unwrap();

    let pipeline = model_pipeline(dir.path()).with_fallback(FallbackPredictor::new(Some(11)));
    let result = pipeline.recommend(&telangana_request()).unwrap();

    assert_eq!(result.provenance, Provenance::Fallback);
    assert!(result
        .crops
        .iter()
        .all(|c| WET_CLIMATE_CROPS.contains(&c.crop.as_str())));
    // The regressor still scores fallback candidates it knows.
    let rice = result.crops.iter().find(|c| c.crop == "rice");
    if let Some(rice) = rice {
        assert_eq!(rice.predicted_yield, Some(4.0));
    }
    assert!(result.predicted_yield.is_some());
}

#[test]
fn shape_mismatch_degrades_to_fallback() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    // Classifier now expects more features than the preprocessor emits.
    let classifier = json!({
        "kind": "forest",
        "classes": ["rice", "maize"],
        "n_features": 9,
        "trees": [{"nodes": [{"type": "leaf", "value": [1.0, 1.0]}]}]
    });
    std::fs::write(dir.path().join(defaults::CLASSIFIER_FILE), classifier.to_string()).unwrap();

    let pipeline = model_pipeline(dir.path()).with_fallback(FallbackPredictor::new(Some(2)));
    let result = pipeline.recommend(&telangana_request()).unwrap();
    assert_eq!(result.provenance, Provenance::Fallback);
    assert_eq!(result.crops.len(), 3);
}
