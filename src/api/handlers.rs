//! API route handlers
//!
//! - Crop and fertilizer recommendation
//! - Sensor reading ingest and latest-reading query
//! - Sensor summary report and form options
//! - Model bundle status
//! - Health

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::envelope::{ApiError, ApiResponse};
use crate::config::defaults;
use crate::fertilizer;
use crate::inference::{BundleStatus, RecommendationPipeline};
use crate::storage::{SensorLog, SensorReading, SensorSummary, ZoneLookup};
use crate::types::{AdviceKind, FeatureRecord, FertilizerAdvice};
use crate::weather::{fill_missing_climate, WeatherProvider};

const NO_READINGS: &str = "No sensor readings stored";

// ============================================================================
// API State
// ============================================================================

/// Shared state for API handlers
#[derive(Clone)]
pub struct AdvisorState {
    pub pipeline: Arc<RecommendationPipeline>,
    /// Fills climate readings the request omits
    pub weather: Option<Arc<dyn WeatherProvider>>,
    pub default_location: String,
    /// Device reading store; `None` runs the ingest endpoint in mock mode
    pub sensors: Option<Arc<dyn SensorLog>>,
    /// Zone table behind the options endpoint
    pub zones: Option<Arc<dyn ZoneLookup>>,
    pub service_name: String,
    pub started_at: DateTime<Utc>,
}

impl AdvisorState {
    pub fn new(pipeline: Arc<RecommendationPipeline>) -> Self {
        Self {
            pipeline,
            weather: None,
            default_location: defaults::DEFAULT_LOCATION.to_string(),
            sensors: None,
            zones: None,
            service_name: defaults::SERVICE_NAME.to_string(),
            started_at: Utc::now(),
        }
    }

    pub fn with_weather(
        mut self,
        provider: Arc<dyn WeatherProvider>,
        default_location: &str,
    ) -> Self {
        self.weather = Some(provider);
        self.default_location = default_location.to_string();
        self
    }

    pub fn with_sensor_log(mut self, sensors: Arc<dyn SensorLog>) -> Self {
        self.sensors = Some(sensors);
        self
    }

    pub fn with_zone_table(mut self, zones: Arc<dyn ZoneLookup>) -> Self {
        self.zones = Some(zones);
        self
    }

    pub fn with_service_name(mut self, name: &str) -> Self {
        self.service_name = name.to_string();
        self
    }
}

// ============================================================================
// Recommendation
// ============================================================================

/// POST /api/predict/recommend
pub async fn recommend(
    State(state): State<AdvisorState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let mut record = match body {
        Ok(Json(Value::Object(map))) if !map.is_empty() => FeatureRecord::from_json_map(&map),
        _ => return Err(ApiError::NoInput),
    };

    if let Some(provider) = &state.weather {
        fill_missing_climate(&mut record, provider.as_ref(), &state.default_location).await;
    }

    let pipeline = Arc::clone(&state.pipeline);
    let recommendation = tokio::task::spawn_blocking(move || pipeline.recommend(&record))
        .await
        .map_err(|e| ApiError::Task(e.to_string()))??;
    Ok((StatusCode::OK, Json(recommendation)).into_response())
}

// ============================================================================
// Sensor Readings
// ============================================================================

#[derive(Debug, Serialize)]
pub struct StoreAck {
    pub status: &'static str,
}

/// POST /api/sensor/data
///
/// 201 `{"status": "stored"}` when persisted, 200 `{"status": "mock_stored"}`
/// when no store is configured.
pub async fn ingest_sensor_data(
    State(state): State<AdvisorState>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Response, ApiError> {
    let value = match body {
        Ok(Json(value @ Value::Object(_))) if value.as_object().is_some_and(|m| !m.is_empty()) => {
            value
        }
        _ => return Err(ApiError::EmptyReading),
    };
    let reading: SensorReading =
        serde_json::from_value(value).map_err(|e| ApiError::InvalidReading(e.to_string()))?;

    let Some(sensors) = &state.sensors else {
        return Ok((StatusCode::OK, Json(StoreAck { status: "mock_stored" })).into_response());
    };

    sensors
        .store_reading(&reading)
        .map_err(|e| ApiError::storage("sensor ingest", e))?;
    Ok((StatusCode::CREATED, Json(StoreAck { status: "stored" })).into_response())
}

/// GET /api/sensor/latest
pub async fn latest_sensor_reading(
    State(state): State<AdvisorState>,
) -> Result<Response, ApiError> {
    let sensors = state
        .sensors
        .as_ref()
        .ok_or_else(|| ApiError::NotFound(NO_READINGS.to_string()))?;
    match sensors.latest_reading() {
        Ok(Some(reading)) => Ok(Json(reading).into_response()),
        Ok(None) => Err(ApiError::NotFound(NO_READINGS.to_string())),
        Err(e) => Err(ApiError::storage("latest reading", e)),
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SummaryReport {
    pub report_id: String,
    pub generated_at: DateTime<Utc>,
    pub period: String,
    pub period_days: i64,
    pub soil_health_summary: SensorSummary,
    /// Advice for the averaged N/P/K and pH
    pub fertilizer_recommendations: Vec<FertilizerAdvice>,
    pub overall_status: &'static str,
}

/// `No Data` for an empty window, `Incomplete` when N, P or K was never
/// reported, `Good` when only the balanced advisory fired.
fn overall_status(summary: &SensorSummary, advice: &[FertilizerAdvice]) -> &'static str {
    if summary.reading_count == 0 {
        "No Data"
    } else if advice.is_empty() {
        "Incomplete"
    } else if advice.iter().all(|a| a.kind == AdviceKind::Balanced) {
        "Good"
    } else {
        "Needs Attention"
    }
}

/// GET /api/report/summary
///
/// Averages of the readings stored in the last `REPORT_WINDOW_DAYS` days.
/// Without a store the report covers no readings.
pub async fn summary_report(
    State(state): State<AdvisorState>,
) -> Result<Response, ApiError> {
    let generated_at = Utc::now();
    let since = generated_at - Duration::days(defaults::REPORT_WINDOW_DAYS);
    let readings = match &state.sensors {
        Some(sensors) => sensors
            .readings_since(since)
            .map_err(|e| ApiError::storage("summary report", e))?,
        None => Vec::new(),
    };

    let summary = SensorSummary::from_readings(&readings);
    let advice = fertilizer::advise_with(
        state.pipeline.settings().fertilizer_profile,
        summary.nitrogen,
        summary.phosphorus,
        summary.potassium,
        summary.ph,
    );

    Ok(Json(SummaryReport {
        report_id: format!("RPT-{}", generated_at.timestamp()),
        generated_at,
        period: format!("Last {} Days", defaults::REPORT_WINDOW_DAYS),
        period_days: defaults::REPORT_WINDOW_DAYS,
        overall_status: overall_status(&summary, &advice),
        soil_health_summary: summary,
        fertilizer_recommendations: advice,
    })
    .into_response())
}

/// Distinct values the web form offers as choices.
#[derive(Debug, Default, Serialize)]
pub struct FormOptions {
    pub state: Vec<String>,
    pub agro_climatic_zone: Vec<String>,
    pub crop: Vec<String>,
}

/// GET /api/data/options
///
/// States and zones from the zone table, crops from the loaded classifier.
/// Each list is sorted and free of duplicates.
pub async fn data_options(
    State(state): State<AdvisorState>,
) -> Result<Response, ApiError> {
    let table = match &state.zones {
        Some(zones) => zones
            .zone_table()
            .map_err(|e| ApiError::storage("zone options", e))?,
        None => Vec::new(),
    };

    let mut states = BTreeSet::new();
    let mut zones = BTreeSet::new();
    for (state_key, zone) in table {
        states.insert(state_key);
        zones.insert(zone);
    }
    let crops: BTreeSet<String> = state
        .pipeline
        .registry()
        .bundle()
        .status()
        .classes
        .into_iter()
        .collect();

    Ok(Json(FormOptions {
        state: states.into_iter().collect(),
        agro_climatic_zone: zones.into_iter().collect(),
        crop: crops.into_iter().collect(),
    })
    .into_response())
}

// ============================================================================
// Models
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ModelsStatus {
    pub bundle: BundleStatus,
    pub can_classify: bool,
    pub can_predict_yield: bool,
    pub top_n: usize,
    pub fertilizer_profile: String,
}

/// GET /api/models/status
pub async fn models_status(State(state): State<AdvisorState>) -> Response {
    let bundle = state.pipeline.registry().bundle();
    let settings = state.pipeline.settings();
    ApiResponse::ok(ModelsStatus {
        bundle: bundle.status(),
        can_classify: bundle.can_classify(),
        can_predict_yield: bundle.can_predict_yield(),
        top_n: settings.top_n,
        fertilizer_profile: settings.fertilizer_profile.to_string(),
    })
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub project: String,
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: i64,
}

/// GET /health
pub async fn health_check(State(state): State<AdvisorState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        project: state.service_name.clone(),
        status: "online",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
    })
}
