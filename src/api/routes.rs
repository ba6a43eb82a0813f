//! API route definitions
//!
//! - POST /api/predict/recommend - crop, yield and fertilizer recommendation
//! - POST /api/sensor/data - device reading ingest
//! - GET  /api/sensor/latest - newest stored reading
//! - GET  /api/report/summary - 30-day sensor averages with fertilizer advice
//! - GET  /api/data/options - states, zones and crops for the web form
//! - GET  /api/models/status - loaded artifacts and expected columns
//! - GET  /health, GET / - liveness

use axum::{routing::{get, post}, Router};

use super::handlers::{self, AdvisorState};

/// Create all /api routes
pub fn api_routes(state: AdvisorState) -> Router {
    Router::new()
        .route("/predict/recommend", post(handlers::recommend))
        .route("/sensor/data", post(handlers::ingest_sensor_data))
        .route("/sensor/latest", get(handlers::latest_sensor_reading))
        .route("/report/summary", get(handlers::summary_report))
        .route("/data/options", get(handlers::data_options))
        .route("/models/status", get(handlers::models_status))
        .with_state(state)
}

/// Health endpoints at root level
pub fn health_routes(state: AdvisorState) -> Router {
    Router::new()
        .route("/", get(handlers::health_check))
        .route("/health", get(handlers::health_check))
        .with_state(state)
}
