//! Publishing interface between the sync cycle and the telemetry transport.
//!
//! The cycle only ever writes through [`TelemetrySink`]; it never reads
//! published values back. Change detection and retention are the
//! transport's business.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::Location;

/// Timestamp format used for published values and forecast entries.
pub const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Instance for current conditions.
pub const INSTANCE_CURRENT: &str = "current";
/// Instance for accumulations over the last hour (rain, snow).
pub const INSTANCE_HOUR: &str = "hour";
/// Instance for the forecast weather description series.
pub const INSTANCE_FORECAST: &str = "forecast";
/// Instance for the forecast maximum temperature series.
pub const INSTANCE_MAX: &str = "max";
/// Instance for the forecast minimum temperature series.
pub const INSTANCE_MIN: &str = "min";

/// Measurement type of a published output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputType {
    Weather,
    Temperature,
    Humidity,
    AtmosphericPressure,
    WindSpeed,
    WindHeading,
    Rain,
    Snow,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Weather => "weather",
            OutputType::Temperature => "temperature",
            OutputType::Humidity => "humidity",
            OutputType::AtmosphericPressure => "atmospheric_pressure",
            OutputType::WindSpeed => "wind_speed",
            OutputType::WindHeading => "wind_heading",
            OutputType::Rain => "rain",
            OutputType::Snow => "snow",
        }
    }

    /// Unit of the published value, if any.
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            OutputType::Weather => None,
            OutputType::Temperature => Some("C"),
            OutputType::Humidity => Some("%"),
            OutputType::AtmosphericPressure => Some("hPa"),
            OutputType::WindSpeed => Some("m/s"),
            OutputType::WindHeading => Some("deg"),
            OutputType::Rain | OutputType::Snow => Some("mm"),
        }
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A (type, instance) channel outputs are published under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Channel {
    #[serde(rename = "type")]
    pub output_type: OutputType,
    pub instance: &'static str,
}

impl Channel {
    pub const fn new(output_type: OutputType, instance: &'static str) -> Self {
        Self {
            output_type,
            instance,
        }
    }
}

/// Channels updated by every successful current-weather fetch.
pub const CURRENT_CHANNELS: [Channel; 8] = [
    Channel::new(OutputType::Weather, INSTANCE_CURRENT),
    Channel::new(OutputType::Temperature, INSTANCE_CURRENT),
    Channel::new(OutputType::Humidity, INSTANCE_CURRENT),
    Channel::new(OutputType::AtmosphericPressure, INSTANCE_CURRENT),
    Channel::new(OutputType::WindSpeed, INSTANCE_CURRENT),
    Channel::new(OutputType::WindHeading, INSTANCE_CURRENT),
    Channel::new(OutputType::Rain, INSTANCE_HOUR),
    Channel::new(OutputType::Snow, INSTANCE_HOUR),
];

/// Channels replaced by every successful forecast fetch.
pub const FORECAST_CHANNELS: [Channel; 3] = [
    Channel::new(OutputType::Weather, INSTANCE_FORECAST),
    Channel::new(OutputType::Temperature, INSTANCE_MAX),
    Channel::new(OutputType::Temperature, INSTANCE_MIN),
];

/// Run state of a location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Ready,
    Error,
}

/// Health of one location after a pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Observation time reported by the weather service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_at: Option<String>,
}

impl HealthStatus {
    pub fn ready(latency_ms: Option<u64>) -> Self {
        Self {
            status: RunState::Ready,
            message: None,
            latency_ms,
            observed_at: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunState::Error,
            message: Some(message.into()),
            latency_ms: None,
            observed_at: None,
        }
    }

    /// Attach the service's observation time. A zero epoch means the
    /// service did not report one and is ignored.
    pub fn observed(mut self, epoch: i64) -> Self {
        self.observed_at = (epoch > 0).then(|| format_epoch(epoch));
        self
    }

    pub fn is_ready(&self) -> bool {
        self.status == RunState::Ready
    }
}

/// One timestamped entry of a forecast series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastValue {
    pub timestamp: String,
    pub epoch: i64,
    pub value: String,
}

/// A complete forecast series for one channel.
pub type ForecastSeries = Vec<ForecastValue>;

/// Outputs a location exposes, announced at startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationDiscovery {
    pub city: String,
    pub language: String,
    pub outputs: Vec<Channel>,
}

/// Format a unix timestamp with [`TIME_FORMAT`] in UTC.
///
/// Out-of-range values fall back to the unix epoch.
pub fn format_epoch(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or_default()
        .format(TIME_FORMAT)
        .to_string()
}

/// Current time formatted with [`TIME_FORMAT`].
pub fn now_timestamp() -> String {
    Utc::now().format(TIME_FORMAT).to_string()
}

/// Errors reported by a sink implementation.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Zenoh error: {0}")]
    Zenoh(String),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<zenoh::Error> for PublishError {
    fn from(err: zenoh::Error) -> Self {
        PublishError::Zenoh(err.to_string())
    }
}

pub type PublishResult<T> = std::result::Result<T, PublishError>;

/// Where the sync cycle sends its results.
#[async_trait]
pub trait TelemetrySink: Send + Sync {
    /// Publish a single output value.
    async fn update_output_value(
        &self,
        location: &Location,
        channel: Channel,
        value: String,
    ) -> PublishResult<()>;

    /// Publish the health of a location.
    async fn set_health_status(&self, location: &Location, status: HealthStatus)
        -> PublishResult<()>;

    /// Replace the forecast series of a channel.
    async fn update_forecast_series(
        &self,
        location: &Location,
        channel: Channel,
        series: ForecastSeries,
    ) -> PublishResult<()>;

    /// Announce the outputs a location provides.
    async fn announce_location(&self, discovery: &LocationDiscovery) -> PublishResult<()>;
}

// ── Recording sink for tests ────────────────────────────────────────

/// In-memory sink for tests. Enabled for integration tests through the
/// `test-util` feature.
#[cfg(any(test, feature = "test-util"))]
pub mod mock {
    use super::*;
    use std::sync::Mutex;

    /// Everything a sink was asked to do, in call order.
    #[derive(Debug, Clone, PartialEq)]
    pub enum SinkEvent {
        Value {
            city: String,
            channel: Channel,
            value: String,
        },
        Health {
            city: String,
            status: HealthStatus,
        },
        Forecast {
            city: String,
            channel: Channel,
            series: ForecastSeries,
        },
        Announce(LocationDiscovery),
    }

    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<SinkEvent>>,
        /// When set, every value update fails (health updates still succeed).
        pub fail_values: bool,
    }

    impl RecordingSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                events: Mutex::new(Vec::new()),
                fail_values: true,
            }
        }

        pub fn events(&self) -> Vec<SinkEvent> {
            self.lock().clone()
        }

        fn lock(&self) -> std::sync::MutexGuard<'_, Vec<SinkEvent>> {
            self.events.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Value updates for a city as (channel, value) pairs.
        pub fn values_for(&self, city: &str) -> Vec<(Channel, String)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SinkEvent::Value {
                        city: c,
                        channel,
                        value,
                    } if c == city => Some((channel, value)),
                    _ => None,
                })
                .collect()
        }

        pub fn value(&self, city: &str, channel: Channel) -> Option<String> {
            self.values_for(city)
                .into_iter()
                .rev()
                .find(|(c, _)| *c == channel)
                .map(|(_, v)| v)
        }

        pub fn health_for(&self, city: &str) -> Vec<HealthStatus> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SinkEvent::Health { city: c, status } if c == city => Some(status),
                    _ => None,
                })
                .collect()
        }

        pub fn forecasts_for(&self, city: &str) -> Vec<(Channel, ForecastSeries)> {
            self.events()
                .into_iter()
                .filter_map(|e| match e {
                    SinkEvent::Forecast {
                        city: c,
                        channel,
                        series,
                    } if c == city => Some((channel, series)),
                    _ => None,
                })
                .collect()
        }

        /// Most recent health status of a city.
        pub fn last_health(&self, city: &str) -> Option<HealthStatus> {
            self.health_for(city).pop()
        }

        /// Most recent series published for a city's channel.
        pub fn forecast(&self, city: &str, channel: Channel) -> Option<ForecastSeries> {
            self.forecasts_for(city)
                .into_iter()
                .rev()
                .find(|(c, _)| *c == channel)
                .map(|(_, series)| series)
        }
    }

    #[async_trait]
    impl TelemetrySink for RecordingSink {
        async fn update_output_value(
            &self,
            location: &Location,
            channel: Channel,
            value: String,
        ) -> PublishResult<()> {
            if self.fail_values {
                return Err(PublishError::Zenoh("mock: publish failed".to_string()));
            }
            self.lock().push(SinkEvent::Value {
                city: location.name.clone(),
                channel,
                value,
            });
            Ok(())
        }

        async fn set_health_status(
            &self,
            location: &Location,
            status: HealthStatus,
        ) -> PublishResult<()> {
            self.lock().push(SinkEvent::Health {
                city: location.name.clone(),
                status,
            });
            Ok(())
        }

        async fn update_forecast_series(
            &self,
            location: &Location,
            channel: Channel,
            series: ForecastSeries,
        ) -> PublishResult<()> {
            self.lock().push(SinkEvent::Forecast {
                city: location.name.clone(),
                channel,
                series,
            });
            Ok(())
        }

        async fn announce_location(&self, discovery: &LocationDiscovery) -> PublishResult<()> {
            self.lock().push(SinkEvent::Announce(discovery.clone()));
            Ok(())
        }
    }
}
