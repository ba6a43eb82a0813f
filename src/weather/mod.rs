//! Weather Lookup
//!
//! Supplies `{temperature, humidity, rainfall}` for a location so requests
//! that omit climate readings can still be scored. Only the fields the caller
//! left out are filled; supplied readings are never overwritten.
//!
//! Providers:
//! - `StaticClimate`: fixed regional normals, no network (default)
//! - `OpenWeatherProvider`: current conditions over HTTP via `reqwest`

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::{WeatherConfig, WeatherProviderKind};
use crate::inference::reconciler;
use crate::types::{columns, FeatureRecord};

/// Climate triple for one location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClimateReading {
    /// °C
    pub temperature: f64,
    /// Relative humidity, %
    pub humidity: f64,
    /// mm
    pub rainfall: f64,
}

/// Weather lookup errors
#[derive(Debug, thiserror::Error)]
pub enum WeatherError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Weather service returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("Unknown location '{0}'")]
    UnknownLocation(String),
}

/// Pluggable weather source.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, location: &str) -> Result<ClimateReading, WeatherError>;

    /// Provider name for logging
    fn provider_name(&self) -> &'static str;
}

// ============================================================================
// Static regional normals
// ============================================================================

/// Normals used for locations not in the table.
pub const DEFAULT_NORMAL: ClimateReading = ClimateReading {
    temperature: 26.0,
    humidity: 65.0,
    rainfall: 100.0,
};

const REGIONAL_NORMALS: &[(&str, ClimateReading)] = &[
    ("hyderabad", ClimateReading { temperature: 27.5, humidity: 58.0, rainfall: 80.0 }),
    ("bengaluru", ClimateReading { temperature: 24.0, humidity: 65.0, rainfall: 95.0 }),
    ("chennai", ClimateReading { temperature: 29.0, humidity: 75.0, rainfall: 120.0 }),
    ("mumbai", ClimateReading { temperature: 28.0, humidity: 78.0, rainfall: 240.0 }),
    ("kolkata", ClimateReading { temperature: 27.0, humidity: 80.0, rainfall: 210.0 }),
    ("delhi", ClimateReading { temperature: 25.0, humidity: 55.0, rainfall: 60.0 }),
    ("pune", ClimateReading { temperature: 25.5, humidity: 60.0, rainfall: 70.0 }),
    ("jaipur", ClimateReading { temperature: 26.0, humidity: 40.0, rainfall: 35.0 }),
    ("jodhpur", ClimateReading { temperature: 27.0, humidity: 35.0, rainfall: 30.0 }),
    ("thiruvananthapuram", ClimateReading { temperature: 27.5, humidity: 82.0, rainfall: 230.0 }),
];

/// Offline provider backed by a table of regional normals.
#[derive(Debug, Clone)]
pub struct StaticClimate {
    normals: HashMap<String, ClimateReading>,
    fallback: ClimateReading,
}

impl StaticClimate {
    pub fn new() -> Self {
        Self {
            normals: REGIONAL_NORMALS
                .iter()
                .map(|(name, reading)| (name.to_string(), *reading))
                .collect(),
            fallback: DEFAULT_NORMAL,
        }
    }
}

impl Default for StaticClimate {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherProvider for StaticClimate {
    async fn current(&self, location: &str) -> Result<ClimateReading, WeatherError> {
        let key = location.trim().to_lowercase();
        Ok(self.normals.get(&key).copied().unwrap_or(self.fallback))
    }

    fn provider_name(&self) -> &'static str {
        "static"
    }
}

// ============================================================================
// OpenWeather
// ============================================================================

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    main: MainBlock,
    #[serde(default)]
    rain: Option<RainBlock>,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    humidity: f64,
}

#[derive(Debug, Deserialize)]
struct RainBlock {
    #[serde(rename = "1h", default)]
    one_hour: Option<f64>,
    #[serde(rename = "3h", default)]
    three_hours: Option<f64>,
}

impl CurrentConditions {
    fn into_reading(self) -> ClimateReading {
        let rainfall = self
            .rain
            .and_then(|r| r.one_hour.or(r.three_hours))
            .unwrap_or(0.0);
        ClimateReading {
            temperature: self.main.temp,
            humidity: self.main.humidity,
            rainfall,
        }
    }
}

/// Current conditions from an OpenWeather-compatible endpoint.
#[derive(Clone)]
pub struct OpenWeatherProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenWeatherProvider {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, WeatherError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current(&self, location: &str) -> Result<ClimateReading, WeatherError> {
        let resp = self
            .http
            .get(format!("{}/weather", self.base_url))
            .query(&[("q", location), ("appid", self.api_key.as_str()), ("units", "metric")])
            .send()
            .await?;

        match resp.status() {
            reqwest::StatusCode::OK => {
                let body: CurrentConditions = resp.json().await?;
                Ok(body.into_reading())
            }
            reqwest::StatusCode::NOT_FOUND => {
                Err(WeatherError::UnknownLocation(location.to_string()))
            }
            status => Err(WeatherError::ServerError(status)),
        }
    }

    fn provider_name(&self) -> &'static str {
        "openweather"
    }
}

/// Build the configured provider. An unusable HTTP provider degrades to the
/// static table.
pub fn build_provider(config: &WeatherConfig) -> Arc<dyn WeatherProvider> {
    match config.provider {
        WeatherProviderKind::Static => Arc::new(StaticClimate::new()),
        WeatherProviderKind::OpenWeather => {
            let Some(api_key) = config.api_key.as_deref().filter(|k| !k.is_empty()) else {
                warn!("weather.provider = \"openweather\" but no api_key set, using static normals");
                return Arc::new(StaticClimate::new());
            };
            match OpenWeatherProvider::new(
                &config.base_url,
                api_key,
                Duration::from_secs(config.timeout_secs),
            ) {
                Ok(provider) => Arc::new(provider),
                Err(e) => {
                    warn!(error = %e, "Failed to build weather client, using static normals");
                    Arc::new(StaticClimate::new())
                }
            }
        }
    }
}

/// Fill whichever of temperature, humidity and rainfall the request lacks.
///
/// Values are written under the short request keys so the reconciler picks
/// them up like caller-supplied readings. Returns the number of fields filled.
/// A lookup failure leaves the record untouched.
pub async fn fill_missing_climate(
    record: &mut FeatureRecord,
    provider: &dyn WeatherProvider,
    default_location: &str,
) -> usize {
    let missing: Vec<(&str, &str)> = [
        (columns::TEMPERATURE, "temperature"),
        (columns::HUMIDITY, "humidity"),
        (columns::RAINFALL, "rainfall"),
    ]
    .into_iter()
    .filter(|(canonical, _)| !reconciler::is_resolved(record, canonical))
    .collect();

    if missing.is_empty() {
        return 0;
    }

    let location = record
        .text("location")
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(default_location)
        .to_string();

    let reading = match provider.current(&location).await {
        Ok(reading) => reading,
        Err(e) => {
            warn!(
                provider = provider.provider_name(),
                location = %location,
                error = %e,
                "Weather lookup failed, leaving climate fields missing"
            );
            return 0;
        }
    };

    for (_, key) in &missing {
        let value = match *key {
            "temperature" => reading.temperature,
            "humidity" => reading.humidity,
            _ => reading.rainfall,
        };
        record.set(key, value);
    }

    debug!(
        provider = provider.provider_name(),
        location = %location,
        filled = missing.len(),
        "Filled climate fields from weather lookup"
    );
    missing.len()
}
