//! Response envelope and the service error type.
//!
//! Status endpoints wrap their payload in [`ApiResponse`]. Every failing
//! handler returns an [`ApiError`], rendered as
//! `{ "error": { "code", "message", "field"? }, "meta": { ... } }` so clients
//! can branch on `code` and point at the offending request field.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::error;

use crate::inference::InputError;
use crate::storage::PersistenceError;

/// Metadata attached to enveloped responses.
#[derive(Debug, Serialize)]
pub struct ResponseMeta {
    pub timestamp: String,
    pub version: &'static str,
}

impl ResponseMeta {
    fn now() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Successful response: `{ "data": T, "meta": { ... } }`
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Response {
        let body = Self {
            data,
            meta: ResponseMeta::now(),
        };
        (StatusCode::OK, Json(body)).into_response()
    }
}

/// Failures a handler can report.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Body missing, malformed, not an object or empty (400)
    #[error("No input data provided")]
    NoInput,

    /// Request field that must be numeric is not (400)
    #[error("invalid numeric value for '{field}': {value}")]
    InvalidNumber { field: String, value: String },

    /// Sensor ingest body missing or empty (400)
    #[error("No data received")]
    EmptyReading,

    /// Sensor payload that does not deserialize (400)
    #[error("Invalid sensor reading: {0}")]
    InvalidReading(String),

    /// Nothing stored for the queried resource (404)
    #[error("{0}")]
    NotFound(String),

    /// Backing store failed; details stay in the log (500)
    #[error("storage failure during {context}: {source}")]
    Storage {
        context: &'static str,
        #[source]
        source: PersistenceError,
    },

    /// Blocking task panicked or was cancelled (500)
    #[error("task failure: {0}")]
    Task(String),
}

impl ApiError {
    pub fn storage(context: &'static str, source: PersistenceError) -> Self {
        Self::Storage { context, source }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoInput
            | Self::EmptyReading
            | Self::InvalidNumber { .. }
            | Self::InvalidReading(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Storage { .. } | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoInput | Self::EmptyReading => "NO_INPUT",
            Self::InvalidNumber { .. } => "INVALID_NUMBER",
            Self::InvalidReading(_) => "INVALID_READING",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Task(_) => "INTERNAL_ERROR",
        }
    }

    fn field(&self) -> Option<&str> {
        match self {
            Self::InvalidNumber { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Client-facing message. Server-side failures get a fixed text.
    fn public_message(&self) -> String {
        match self {
            Self::Storage { .. } | Self::Task(_) => "Internal Server Error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<InputError> for ApiError {
    fn from(err: InputError) -> Self {
        match err {
            InputError::Empty => Self::NoInput,
            InputError::InvalidNumber { field, value } => Self::InvalidNumber { field, value },
        }
    }
}

/// Error detail inside [`ApiErrorResponse`].
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

/// Error body: `{ "error": { ... }, "meta": { ... } }`
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub error: ErrorDetail,
    pub meta: ResponseMeta,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code(), error = %self, "Request failed");
        }
        let body = ApiErrorResponse {
            error: ErrorDetail {
                code: self.code(),
                message: self.public_message(),
                field: self.field().map(str::to_string),
            },
            meta: ResponseMeta::now(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_ok_response_shape() {
        let resp = ApiResponse::ok(serde_json::json!({"classifier_loaded": false}));
        assert_eq!(resp.status(), StatusCode::OK);

        let v = body_json(resp).await;
        assert_eq!(v["data"]["classifier_loaded"], false);
        assert_eq!(v["meta"]["version"], env!("CARGO_PKG_VERSION"));
    }

    #[tokio::test]
    async fn test_invalid_number_names_the_field() {
        let err = ApiError::from(InputError::InvalidNumber {
            field: "N".to_string(),
            value: "\"lots\"".to_string(),
        });
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let v = body_json(resp).await;
        assert_eq!(v["error"]["code"], "INVALID_NUMBER");
        assert_eq!(v["error"]["field"], "N");
        assert!(v["meta"]["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_empty_input_maps_to_no_input() {
        let resp = ApiError::from(InputError::Empty).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let v = body_json(resp).await;
        assert_eq!(v["error"]["code"], "NO_INPUT");
        assert_eq!(v["error"]["message"], "No input data provided");
        assert!(v["error"].get("field").is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_hides_details() {
        let err = ApiError::storage(
            "latest reading",
            PersistenceError::Storage("disk on fire".to_string()),
        );
        assert_eq!(err.code(), "STORAGE_ERROR");
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let v = body_json(resp).await;
        assert_eq!(v["error"]["message"], "Internal Server Error");
    }
}
