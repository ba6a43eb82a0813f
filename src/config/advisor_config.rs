//! Advisor Configuration - service, model and rule settings as TOML values
//!
//! Each struct implements `Default`, so a missing file or a partial file
//! behaves exactly like the built-in settings for every omitted key.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::defaults;
use crate::fertilizer::FertilizerProfile;

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for one advisor deployment.
///
/// Load with `AdvisorConfig::load()` which searches:
/// 1. `$MITTI_CONFIG` env var
/// 2. `./advisor_config.toml`
/// 3. Built-in defaults
///
/// `MITTI_SERVER_ADDR` and `MITTI_MODEL_DIR` are applied on top of whichever
/// source won.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Model artifact locations
    #[serde(default)]
    pub models: ModelConfig,

    #[serde(default)]
    pub inference: InferenceConfig,

    #[serde(default)]
    pub fertilizer: FertilizerConfig,

    #[serde(default)]
    pub weather: WeatherConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

impl AdvisorConfig {
    /// Load configuration using the standard search order, then apply
    /// environment overrides.
    pub fn load() -> Self {
        let mut config = Self::load_from_search_path();
        config.apply_env_overrides();
        config
    }

    fn load_from_search_path() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(
                            path = %p.display(),
                            "Loaded advisor config from {}",
                            defaults::CONFIG_ENV_VAR
                        );
                        return config;
                    }
                    Err(e) => {
                        warn!(
                            path = %p.display(),
                            error = %e,
                            "Failed to load config from {}, falling back",
                            defaults::CONFIG_ENV_VAR
                        );
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./advisor_config.toml
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded advisor config from ./{}", defaults::LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "Failed to load ./{}, using defaults",
                        defaults::LOCAL_CONFIG_FILE
                    );
                }
            }
        }

        // 3. Defaults
        info!("No {} found, using built-in defaults", defaults::LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(_, inner) => ConfigError::Parse(path.to_path_buf(), inner),
            other => other,
        })
    }

    /// Parse and validate a TOML document.
    ///
    /// Unknown keys are logged as warnings and never fail the load.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        for w in super::validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let config: Self = toml::from_str(contents)
            .map_err(|e| ConfigError::Parse(PathBuf::new(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `MITTI_SERVER_ADDR` and `MITTI_MODEL_DIR`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(addr) = std::env::var(defaults::SERVER_ADDR_ENV_VAR) {
            if !addr.trim().is_empty() {
                info!(addr = %addr, "Server address overridden from environment");
                self.server.addr = addr.trim().to_string();
            }
        }
        if let Ok(dir) = std::env::var(defaults::MODEL_DIR_ENV_VAR) {
            if !dir.trim().is_empty() {
                info!(dir = %dir, "Model directory overridden from environment");
                self.models.dir = dir.trim().to_string();
            }
        }
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate value ranges, collecting every error before failing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (errors, warnings) = super::validation::validate_ranges(self);
        for w in &warnings {
            warn!("{}", w);
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Parsed listen address.
    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .addr
            .parse()
            .map_err(|e| {
                ConfigError::Validation(vec![format!("server.addr = '{}': {e}", self.server.addr)])
            })
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Service
// ============================================================================

/// Identification reported by the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,
}

fn default_service_name() -> String {
    defaults::SERVICE_NAME.to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
        }
    }
}

// ============================================================================
// Server
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address, `host:port`
    #[serde(default = "default_server_addr")]
    pub addr: String,
}

fn default_server_addr() -> String {
    defaults::DEFAULT_SERVER_ADDR.to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: default_server_addr(),
        }
    }
}

// ============================================================================
// Models
// ============================================================================

/// Artifact directory and file names. A missing file is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model_dir")]
    pub dir: String,
    #[serde(default = "default_classifier_file")]
    pub classifier_file: String,
    #[serde(default = "default_classifier_preprocessor_file")]
    pub classifier_preprocessor_file: String,
    #[serde(default = "default_regressor_file")]
    pub regressor_file: String,
    #[serde(default = "default_regressor_preprocessor_file")]
    pub regressor_preprocessor_file: String,
}

fn default_model_dir() -> String {
    defaults::DEFAULT_MODEL_DIR.to_string()
}

fn default_classifier_file() -> String {
    defaults::CLASSIFIER_FILE.to_string()
}

fn default_classifier_preprocessor_file() -> String {
    defaults::CLASSIFIER_PREPROCESSOR_FILE.to_string()
}

fn default_regressor_file() -> String {
    defaults::REGRESSOR_FILE.to_string()
}

fn default_regressor_preprocessor_file() -> String {
    defaults::REGRESSOR_PREPROCESSOR_FILE.to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            dir: default_model_dir(),
            classifier_file: default_classifier_file(),
            classifier_preprocessor_file: default_classifier_preprocessor_file(),
            regressor_file: default_regressor_file(),
            regressor_preprocessor_file: default_regressor_preprocessor_file(),
        }
    }
}

// ============================================================================
// Inference
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceConfig {
    /// Crop candidates per response
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Classifier probabilities below this are dropped
    #[serde(default = "default_min_probability")]
    pub min_probability: f64,

    /// Seed for the fallback sampler. Unset seeds from entropy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_seed: Option<u64>,
}

fn default_top_n() -> usize {
    defaults::DEFAULT_TOP_N
}

fn default_min_probability() -> f64 {
    defaults::DEFAULT_MIN_PROBABILITY
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            min_probability: default_min_probability(),
            fallback_seed: None,
        }
    }
}

// ============================================================================
// Fertilizer
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FertilizerConfig {
    /// `standard` or `compact`
    #[serde(default)]
    pub profile: FertilizerProfile,
}

// ============================================================================
// Weather
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherProviderKind {
    /// Built-in regional normals
    #[default]
    Static,
    /// OpenWeather current conditions
    OpenWeather,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default)]
    pub provider: WeatherProviderKind,

    /// Location used when the request has none
    #[serde(default = "default_location")]
    pub default_location: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_weather_base_url")]
    pub base_url: String,

    #[serde(default = "default_weather_timeout")]
    pub timeout_secs: u64,
}

fn default_location() -> String {
    defaults::DEFAULT_LOCATION.to_string()
}

fn default_weather_base_url() -> String {
    defaults::OPENWEATHER_BASE_URL.to_string()
}

fn default_weather_timeout() -> u64 {
    defaults::WEATHER_TIMEOUT_SECS
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider: WeatherProviderKind::default(),
            default_location: default_location(),
            api_key: None,
            base_url: default_weather_base_url(),
            timeout_secs: default_weather_timeout(),
        }
    }
}

// ============================================================================
// Storage
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sled database directory
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Write every served recommendation to the audit log
    #[serde(default = "default_true")]
    pub audit_enabled: bool,
}

fn default_store_path() -> String {
    defaults::DEFAULT_STORE_PATH.to_string()
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            audit_enabled: true,
        }
    }
}
