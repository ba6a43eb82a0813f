//! REST API module using Axum
//!
//! HTTP surface of the recommendation service. Recommendation, sensor and
//! health responses keep the flat JSON shapes field devices and the web
//! client expect; status and error responses use the envelope.

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::AdvisorState;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::defaults;

/// Build the CORS layer.
///
/// `MITTI_CORS_ORIGINS` restricts cross-origin access to a comma-separated
/// list of origins. Unset allows any origin, matching the field deployment
/// where the web client and the devices are served from other hosts.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var(defaults::CORS_ORIGINS_ENV_VAR) {
        Ok(origins) => {
            let allowed: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base.allow_origin(Any),
    }
}

/// Create the complete application router.
pub fn create_app(state: AdvisorState) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .nest("/api", routes::api_routes(state.clone()))
        .merge(routes::health_routes(state))
        // Middleware
        .layer(DefaultBodyLimit::max(defaults::MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
}
