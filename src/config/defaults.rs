//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Service
// ============================================================================

/// Project name reported by the health endpoint.
pub const SERVICE_NAME: &str = "Mitti Mitra";

/// Environment variable naming the TOML config file.
pub const CONFIG_ENV_VAR: &str = "MITTI_CONFIG";

/// Config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "advisor_config.toml";

// ============================================================================
// Server
// ============================================================================

pub const DEFAULT_SERVER_ADDR: &str = "0.0.0.0:5000";

/// Overrides `server.addr`.
pub const SERVER_ADDR_ENV_VAR: &str = "MITTI_SERVER_ADDR";

/// Comma-separated allowed CORS origins. Unset means any origin.
pub const CORS_ORIGINS_ENV_VAR: &str = "MITTI_CORS_ORIGINS";

/// Request body limit for the JSON endpoints (bytes).
pub const MAX_BODY_BYTES: usize = 64 * 1024;

// ============================================================================
// Models
// ============================================================================

pub const DEFAULT_MODEL_DIR: &str = "./models";

/// Overrides `models.dir`.
pub const MODEL_DIR_ENV_VAR: &str = "MITTI_MODEL_DIR";

pub const CLASSIFIER_FILE: &str = "rf_crop_model.json";
pub const CLASSIFIER_PREPROCESSOR_FILE: &str = "preprocessor_clf.json";
pub const REGRESSOR_FILE: &str = "xgb_yield_model.json";
pub const REGRESSOR_PREPROCESSOR_FILE: &str = "preprocessor_reg.json";

// ============================================================================
// Inference
// ============================================================================

/// Crop candidates returned per request.
pub const DEFAULT_TOP_N: usize = 3;

/// Classifier probabilities below this are dropped.
pub const DEFAULT_MIN_PROBABILITY: f64 = 0.01;

// ============================================================================
// Weather
// ============================================================================

/// Location used when the request names none.
pub const DEFAULT_LOCATION: &str = "Hyderabad";

pub const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

/// HTTP timeout for weather lookups (seconds).
pub const WEATHER_TIMEOUT_SECS: u64 = 5;

// ============================================================================
// Storage
// ============================================================================

pub const DEFAULT_STORE_PATH: &str = "./data/mitti_mitra.db";

/// Lookback window of the sensor summary report (days).
pub const REPORT_WINDOW_DAYS: i64 = 30;
