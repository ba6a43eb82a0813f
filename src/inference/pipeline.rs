//! Recommendation Pipeline
//!
//! Sequential, per-request orchestration:
//!
//! ```text
//! raw record → reconcile → zone enrichment → classify ─┬─ Ranked ──────┐
//!                                                      ├─ SensorFault ─┤→ yield cascade → fertilizer → response
//!                                                      └─ Failed → fallback sampler ─┘
//! ```
//!
//! Model faults never reach the caller; only input faults do. The pipeline
//! is CPU-bound and synchronous; the HTTP layer runs it on the blocking pool.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::classifier::{ClassificationStage, StageOutcome, MIN_PROBABILITY};
use super::fallback::FallbackPredictor;
use super::reconciler::{self, InputError};
use super::registry::ModelRegistry;
use super::yield_cascade::predict_yields;
use crate::config::{defaults, AdvisorConfig};
use crate::fertilizer::{self, FertilizerProfile};
use crate::storage::{AuditSink, PredictionRecord, ZoneLookup};
use crate::types::{
    columns, Classification, FeatureRecord, FertilizerAdvice, PredictionCandidate, Provenance,
    SoilSample, YieldStatus,
};

/// Tunables for one pipeline instance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    pub top_n: usize,
    pub min_probability: f64,
    pub fertilizer_profile: FertilizerProfile,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_n: defaults::DEFAULT_TOP_N,
            min_probability: MIN_PROBABILITY,
            fertilizer_profile: FertilizerProfile::Standard,
        }
    }
}

impl PipelineSettings {
    pub fn from_config(config: &AdvisorConfig) -> Self {
        Self {
            top_n: config.inference.top_n,
            min_probability: config.inference.min_probability,
            fertilizer_profile: config.fertilizer.profile,
        }
    }
}

/// Response body of a successful recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub status: &'static str,
    pub crops: Vec<PredictionCandidate>,
    /// Attached yields in candidate order, `null` when none were produced
    pub predicted_yield: Option<Vec<f64>>,
    pub fertilizer_recommendations: Vec<FertilizerAdvice>,
    pub used_params: FeatureRecord,
    #[serde(skip)]
    pub provenance: Provenance,
    #[serde(skip)]
    pub yield_status: YieldStatus,
}

/// Crop and fertilizer recommendation pipeline.
pub struct RecommendationPipeline {
    registry: Arc<ModelRegistry>,
    fallback: FallbackPredictor,
    stage: ClassificationStage,
    settings: PipelineSettings,
    zones: Option<Arc<dyn ZoneLookup>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl RecommendationPipeline {
    pub fn new(registry: Arc<ModelRegistry>, settings: PipelineSettings) -> Self {
        Self {
            registry,
            fallback: FallbackPredictor::default(),
            stage: ClassificationStage::new(settings.min_probability),
            settings,
            zones: None,
            audit: None,
        }
    }

    pub fn with_fallback(mut self, fallback: FallbackPredictor) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_zone_lookup(mut self, zones: Arc<dyn ZoneLookup>) -> Self {
        self.zones = Some(zones);
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Run the full pipeline on one raw request record.
    pub fn recommend(&self, raw: &FeatureRecord) -> Result<Recommendation, InputError> {
        if raw.is_empty() {
            return Err(InputError::Empty);
        }

        let mut record = reconciler::normalize(raw)?;
        self.enrich_zone(&mut record);
        let sample = SoilSample::from_record(&record);

        let Classification {
            mut candidates,
            provenance,
        } = self.classify(&sample);

        let yield_status = predict_yields(self.registry.bundle(), &sample, &mut candidates);
        let predicted_yield = aggregate_yields(&candidates);

        let fertilizer_recommendations = fertilizer::advise_with(
            self.settings.fertilizer_profile,
            sample.nitrogen,
            sample.phosphorus,
            sample.potassium,
            sample.ph,
        );

        info!(
            provenance = %provenance,
            crops = candidates.len(),
            yields = yield_status.attached(),
            advisories = fertilizer_recommendations.len(),
            "Recommendation complete"
        );

        let recommendation = Recommendation {
            status: "success",
            crops: candidates,
            predicted_yield,
            fertilizer_recommendations,
            used_params: record,
            provenance,
            yield_status,
        };
        self.audit(&recommendation);
        Ok(recommendation)
    }

    /// Classification with the fallback policy applied.
    pub fn classify(&self, sample: &SoilSample) -> Classification {
        let bundle = self.registry.bundle();
        match self.stage.run(bundle, sample, self.settings.top_n) {
            StageOutcome::Ranked(candidates) => Classification {
                candidates,
                provenance: Provenance::Model,
            },
            StageOutcome::SensorFault => {
                warn!("All soil readings are zero, treating as sensor failure");
                Classification {
                    candidates: Vec::new(),
                    provenance: Provenance::SensorFault,
                }
            }
            StageOutcome::Failed(e) => {
                if bundle.can_classify() {
                    warn!(error = %e, "Classifier failed, using fallback sampler");
                } else {
                    debug!(error = %e, "Classifier not loaded, using fallback sampler");
                }
                Classification {
                    candidates: self.fallback.predict(self.settings.top_n, sample.rainfall),
                    provenance: Provenance::Fallback,
                }
            }
        }
    }

    /// Fill `agro_climatic_zone` from the state when only the state is known.
    fn enrich_zone(&self, record: &mut FeatureRecord) {
        let Some(zones) = &self.zones else {
            return;
        };
        if record.is_present(columns::ZONE) {
            return;
        }
        let Some(state) = record.text(columns::STATE).map(str::to_string) else {
            return;
        };
        match zones.lookup_zone(&state) {
            Ok(Some(zone)) => {
                debug!(state = %state, zone = %zone, "Zone enriched from state");
                record.set(columns::ZONE, zone);
            }
            Ok(None) => {}
            Err(e) => warn!(state = %state, error = %e, "Zone lookup failed"),
        }
    }

    fn audit(&self, recommendation: &Recommendation) {
        let Some(sink) = &self.audit else {
            return;
        };
        let used_params = match serde_json::to_value(&recommendation.used_params) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Failed to serialize audit record");
                return;
            }
        };
        let record = PredictionRecord {
            timestamp: Utc::now(),
            provenance: recommendation.provenance,
            crops: recommendation.crops.clone(),
            predicted_yield: recommendation.predicted_yield.clone(),
            fertilizer_recommendations: recommendation.fertilizer_recommendations.clone(),
            used_params,
        };
        if let Err(e) = sink.record_prediction(&record) {
            warn!(backend = sink.backend_name(), error = %e, "Audit write failed");
        }
    }
}

/// Attached yields in candidate order; `None` when there are none.
fn aggregate_yields(candidates: &[PredictionCandidate]) -> Option<Vec<f64>> {
    let yields: Vec<f64> = candidates.iter().filter_map(|c| c.predicted_yield).collect();
    if yields.is_empty() {
        None
    } else {
        Some(yields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::fallback::{ARID_CROPS, WET_CLIMATE_CROPS};
    use crate::inference::registry::ModelBundle;
    use crate::storage::{InMemoryStore, PersistenceError};

    fn pipeline() -> RecommendationPipeline {
        RecommendationPipeline::new(
            Arc::new(ModelRegistry::preloaded(ModelBundle::empty())),
            PipelineSettings::default(),
        )
        .with_fallback(FallbackPredictor::new(Some(11)))
    }

    fn request(pairs: &[(&str, serde_json::Value)]) -> FeatureRecord {
        let map = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect::<serde_json::Map<_, _>>();
        FeatureRecord::from_json_map(&map)
    }

    struct BrokenZones;

    impl ZoneLookup for BrokenZones {
        fn lookup_zone(&self, _state: &str) -> Result<Option<String>, PersistenceError> {
            Err(PersistenceError::Storage("offline".to_string()))
        }

        fn zone_table(&self) -> Result<Vec<(String, String)>, PersistenceError> {
            Err(PersistenceError::Storage("offline".to_string()))
        }
    }

    #[test]
    fn test_empty_request_rejected() {
        assert_eq!(
            pipeline().recommend(&FeatureRecord::new()).unwrap_err(),
            InputError::Empty
        );
    }

    #[test]
    fn test_invalid_number_surfaces() {
        let err = pipeline()
            .recommend(&request(&[("N", "abc".into())]))
            .unwrap_err();
        assert!(matches!(err, InputError::InvalidNumber { ref field, .. } if field == "N"));
    }

    #[test]
    fn test_no_models_uses_banded_fallback() {
        let out = pipeline()
            .recommend(&request(&[("N", 90.into()), ("rainfall", 20.into())]))
            .unwrap();
        assert_eq!(out.provenance, Provenance::Fallback);
        assert_eq!(out.crops.len(), 3);
        assert!(out.crops.iter().all(|c| ARID_CROPS.contains(&c.crop.as_str())));
        assert_eq!(out.yield_status, YieldStatus::Unavailable);
        assert!(out.predicted_yield.is_none());
    }

    #[test]
    fn test_zero_reading_returns_no_crops() {
        let out = pipeline()
            .recommend(&request(&[
                ("N", 0.into()),
                ("P", 0.into()),
                ("K", 0.into()),
                ("ph", 0.into()),
                ("temperature", 0.into()),
                ("humidity", 0.into()),
                ("rainfall", 0.into()),
            ]))
            .unwrap();
        assert_eq!(out.provenance, Provenance::SensorFault);
        assert!(out.crops.is_empty());
        assert!(out.predicted_yield.is_none());
    }

    #[test]
    fn test_zone_enrichment_only_when_absent() {
        let store = Arc::new(InMemoryStore::with_zones([("Telangana", "Southern Plateau")]));
        let p = pipeline().with_zone_lookup(store);

        let out = p
            .recommend(&request(&[("state", "Telangana".into()), ("rainfall", 250.into())]))
            .unwrap();
        assert_eq!(out.used_params.text("agro_climatic_zone"), Some("Southern Plateau"));

        let out = p
            .recommend(&request(&[
                ("state", "Telangana".into()),
                ("agro_climatic_zone", "Custom".into()),
            ]))
            .unwrap();
        assert_eq!(out.used_params.text("agro_climatic_zone"), Some("Custom"));
    }

    #[test]
    fn test_zone_lookup_failure_is_not_fatal() {
        let p = pipeline().with_zone_lookup(Arc::new(BrokenZones));
        let out = p
            .recommend(&request(&[("state", "Goa".into()), ("rainfall", 300.into())]))
            .unwrap();
        assert!(out.used_params.get("agro_climatic_zone").unwrap().is_missing());
        assert!(out.crops.iter().all(|c| WET_CLIMATE_CROPS.contains(&c.crop.as_str())));
    }

    #[test]
    fn test_audit_record_written() {
        let store = Arc::new(InMemoryStore::new());
        let p = pipeline().with_audit_sink(store.clone());
        p.recommend(&request(&[("N", 30.into()), ("P", 35.into()), ("K", 25.into())]))
            .unwrap();

        let records = store.predictions();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].provenance, Provenance::Fallback);
        assert_eq!(records[0].used_params["soil_n"], serde_json::json!(30.0));
    }

    #[test]
    fn test_aggregate_yields() {
        let mut a = PredictionCandidate::new("rice", 0.6);
        a.predicted_yield = Some(3.0);
        let b = PredictionCandidate::new("jute", 0.3);
        assert_eq!(aggregate_yields(&[a, b.clone()]), Some(vec![3.0]));
        assert_eq!(aggregate_yields(&[b]), None);
    }
}
