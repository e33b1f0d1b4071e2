//! OpenWeatherMap API client.
//!
//! Issues one HTTP request per call and normalizes the loosely-shaped
//! JSON responses into flat readings. Missing or malformed numeric
//! fields default to zero; only a body that does not have the expected
//! overall shape is a decode error.

use async_trait::async_trait;
use serde::de::Deserializer;
use serde::Deserialize;
use std::time::Duration;

use crate::config::{Config, ForecastKind, Location};

// ── Errors ──────────────────────────────────────────────────────────

/// Errors from weather API operations.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The service rejected the API key.
    #[error("Invalid API key (status {status})")]
    Auth { status: u16 },

    /// Any other non-success status, or a transport failure (no status).
    #[error("Request failed: {message}")]
    Request { status: Option<u16>, message: String },

    /// The response body does not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// The forecast response carries no forecast list.
    #[error("Forecast not provided")]
    EmptyForecast,
}

impl From<reqwest::Error> for ApiError {
    /// Drops the URL; its query string carries the API key.
    fn from(err: reqwest::Error) -> Self {
        ApiError::Request {
            status: err.status().map(|s| s.as_u16()),
            message: err.without_url().to_string(),
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

// ── Normalized readings ─────────────────────────────────────────────

/// Current conditions for one location.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CurrentReading {
    /// City name as reported by the service
    pub city: String,
    /// Degrees Celsius
    pub temperature: f64,
    /// Relative humidity in percent
    pub humidity: u32,
    /// Atmospheric pressure in hPa
    pub pressure: f64,
    /// Meters per second
    pub wind_speed: f64,
    /// Degrees
    pub wind_heading: f64,
    /// Rain volume for the last hour, mm
    pub rain_last_hour: f64,
    /// Snow volume for the last hour, mm
    pub snow_last_hour: f64,
    /// First weather description, empty if none was reported
    pub description: String,
    /// Observation time, unix seconds UTC
    pub timestamp: i64,
}

/// One forecast entry.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForecastPoint {
    /// Forecast time, unix seconds UTC
    pub epoch: i64,
    pub description: String,
    pub temp_max: f64,
    pub temp_min: f64,
}

// ── Source trait ────────────────────────────────────────────────────

/// A provider of weather readings.
///
/// The sync cycle only talks to this trait so it can be driven by a mock
/// in tests.
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Fetch the current conditions for a location.
    async fn fetch_current(&self, location: &Location) -> ApiResult<CurrentReading>;

    /// Fetch the forecast for a location, in the order the service returns it.
    async fn fetch_forecast(&self, location: &Location) -> ApiResult<Vec<ForecastPoint>>;
}

// ── Client ──────────────────────────────────────────────────────────

/// reqwest-backed OpenWeatherMap client.
#[derive(Debug, Clone)]
pub struct OpenWeatherMapClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    forecast_kind: ForecastKind,
}

impl OpenWeatherMapClient {
    /// Create a client. The timeout bounds every request made by it.
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
        forecast_kind: ForecastKind,
    ) -> ApiResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            forecast_kind,
        })
    }

    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Self::new(
            config.api_key.clone(),
            config.base_url.clone(),
            config.timeout(),
            config.forecast.kind,
        )
    }

    pub fn forecast_kind(&self) -> ForecastKind {
        self.forecast_kind
    }

    /// GET `{base_url}/{endpoint}` for a location and return the raw body.
    async fn get(&self, endpoint: &str, location: &Location) -> ApiResult<String> {
        let url = format!("{}/{}", self.base_url, endpoint);
        log::debug!("GET {} q={} lang={}", url, location.name, location.language);

        let response = self
            .client
            .get(&url)
            .query(&[
                ("q", location.name.as_str()),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("lang", location.language.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Request {
                status: Some(status.as_u16()),
                message: format!("status {}: {}", status.as_u16(), error_message(&body)),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherMapClient {
    async fn fetch_current(&self, location: &Location) -> ApiResult<CurrentReading> {
        let body = self.get("weather", location).await?;
        parse_current(&body)
    }

    async fn fetch_forecast(&self, location: &Location) -> ApiResult<Vec<ForecastPoint>> {
        match self.forecast_kind {
            ForecastKind::Daily => {
                let body = self.get("forecast/daily", location).await?;
                parse_daily_forecast(&body)
            }
            ForecastKind::ThreeHourly => {
                let body = self.get("forecast", location).await?;
                parse_three_hourly_forecast(&body)
            }
        }
    }
}

/// Pull the service's `message` out of an error body, falling back to the
/// raw text.
fn error_message(body: &str) -> String {
    serde_json::from_str::<wire::ErrorBody>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| body.trim().to_string())
}

// ── Normalization ───────────────────────────────────────────────────

/// Parse a current-weather body.
pub fn parse_current(body: &str) -> ApiResult<CurrentReading> {
    let raw: wire::CurrentWeather =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;

    let main = raw.main.unwrap_or_default();
    let wind = raw.wind.unwrap_or_default();

    Ok(CurrentReading {
        city: raw.name.unwrap_or_default(),
        temperature: main.temp,
        humidity: main.humidity.round().max(0.0) as u32,
        pressure: main.pressure,
        wind_speed: wind.speed,
        wind_heading: wind.deg,
        rain_last_hour: raw.rain.unwrap_or_default().last_hour,
        snow_last_hour: raw.snow.unwrap_or_default().last_hour,
        description: first_description(raw.weather),
        timestamp: raw.dt as i64,
    })
}

/// Parse a 16 day daily forecast body.
pub fn parse_daily_forecast(body: &str) -> ApiResult<Vec<ForecastPoint>> {
    let raw: wire::DailyForecast =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let list = raw.list.ok_or(ApiError::EmptyForecast)?;

    Ok(list
        .into_iter()
        .map(|entry| {
            let temp = entry.temp.unwrap_or_default();
            ForecastPoint {
                epoch: entry.dt as i64,
                description: first_description(entry.weather),
                temp_max: temp.max,
                temp_min: temp.min,
            }
        })
        .collect())
}

/// Parse a 5 day / 3 hour forecast body.
pub fn parse_three_hourly_forecast(body: &str) -> ApiResult<Vec<ForecastPoint>> {
    let raw: wire::ThreeHourlyForecast =
        serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))?;
    let list = raw.list.ok_or(ApiError::EmptyForecast)?;

    Ok(list
        .into_iter()
        .map(|entry| {
            let main = entry.main.unwrap_or_default();
            ForecastPoint {
                epoch: entry.dt as i64,
                description: first_description(entry.weather),
                temp_max: main.temp_max,
                temp_min: main.temp_min,
            }
        })
        .collect())
}

fn first_description(weather: Option<Vec<wire::Condition>>) -> String {
    weather
        .and_then(|conditions| conditions.into_iter().next())
        .and_then(|c| c.description)
        .unwrap_or_default()
}

/// Accept a number, a numeric string, or null/garbage (as zero).
fn lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or_default(),
        serde_json::Value::String(s) => s.trim().parse().unwrap_or_default(),
        _ => 0.0,
    })
}

// ── Wire format ─────────────────────────────────────────────────────

mod wire {
    use super::lenient_f64;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    pub struct ErrorBody {
        pub message: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    pub struct Condition {
        #[serde(default)]
        pub description: Option<String>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct Main {
        #[serde(deserialize_with = "lenient_f64")]
        pub temp: f64,
        #[serde(deserialize_with = "lenient_f64")]
        pub humidity: f64,
        #[serde(deserialize_with = "lenient_f64")]
        pub pressure: f64,
        #[serde(deserialize_with = "lenient_f64")]
        pub temp_max: f64,
        #[serde(deserialize_with = "lenient_f64")]
        pub temp_min: f64,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct Wind {
        #[serde(deserialize_with = "lenient_f64")]
        pub speed: f64,
        #[serde(deserialize_with = "lenient_f64")]
        pub deg: f64,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct Precipitation {
        #[serde(rename = "1h", deserialize_with = "lenient_f64")]
        pub last_hour: f64,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct CurrentWeather {
        pub name: Option<String>,
        #[serde(deserialize_with = "lenient_f64")]
        pub dt: f64,
        pub main: Option<Main>,
        pub wind: Option<Wind>,
        pub rain: Option<Precipitation>,
        pub snow: Option<Precipitation>,
        pub weather: Option<Vec<Condition>>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct DailyTemperature {
        #[serde(deserialize_with = "lenient_f64")]
        pub max: f64,
        #[serde(deserialize_with = "lenient_f64")]
        pub min: f64,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct DailyEntry {
        #[serde(deserialize_with = "lenient_f64")]
        pub dt: f64,
        pub temp: Option<DailyTemperature>,
        pub weather: Option<Vec<Condition>>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct DailyForecast {
        pub list: Option<Vec<DailyEntry>>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct ThreeHourlyEntry {
        #[serde(deserialize_with = "lenient_f64")]
        pub dt: f64,
        pub main: Option<Main>,
        pub weather: Option<Vec<Condition>>,
    }

    #[derive(Debug, Default, Deserialize)]
    #[serde(default)]
    pub struct ThreeHourlyForecast {
        pub list: Option<Vec<ThreeHourlyEntry>>,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
