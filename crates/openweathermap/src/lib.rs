//! OpenWeatherMap weather publisher for Zenoh.
//!
//! Polls the OpenWeatherMap 2.5 API for a list of cities and publishes:
//! - Current conditions (eight channels per city)
//! - Forecast max/min temperature and description series
//! - A per-city health status (ready or error)
//!
//! One city's failure never stops the other cities from being published.

pub mod api;
pub mod config;
pub mod cycle;
pub mod error;
pub mod health;
pub mod node;
pub mod shutdown;
pub mod sink;
pub mod zenoh_session;
pub mod zenoh_sink;

pub use api::{ApiError, CurrentReading, ForecastPoint, OpenWeatherMapClient, WeatherSource};
pub use config::{Config, ConfigError, ForecastKind, Location};
pub use cycle::{CycleSummary, WeatherSyncCycle};
pub use error::NodeError;
pub use node::WeatherNode;
pub use sink::{
    Channel, ForecastSeries, ForecastValue, HealthStatus, LocationDiscovery, OutputType,
    PublishError, RunState, TelemetrySink,
};
pub use zenoh_sink::{Keys, ZenohSink};
