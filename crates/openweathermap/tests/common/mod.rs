//! Test helpers for the OpenWeatherMap integration tests

#![allow(dead_code)]

use openweathermap::{ForecastKind, OpenWeatherMapClient};
use std::time::Duration;
use wiremock::MockServer;

pub const API_KEY: &str = "test-key";

/// Current weather body for Amsterdam.
pub fn amsterdam_current() -> serde_json::Value {
    serde_json::json!({
        "coord": {"lon": 4.89, "lat": 52.37},
        "weather": [{"id": 500, "main": "Rain", "description": "light rain", "icon": "10d"}],
        "main": {"temp": 18.35, "pressure": 1013.2, "humidity": 65},
        "wind": {"speed": 3.4, "deg": 270},
        "rain": {"1h": 0.002},
        "dt": 1583020800,
        "name": "Amsterdam"
    })
}

/// Current weather body for Vancouver, snowing, no rain.
pub fn vancouver_current() -> serde_json::Value {
    serde_json::json!({
        "weather": [{"description": "neige"}],
        "main": {"temp": -2.0, "pressure": 1020, "humidity": 90},
        "wind": {"speed": 1.0, "deg": 45},
        "snow": {"1h": 0.5},
        "dt": 1583024400,
        "name": "Vancouver"
    })
}

/// Daily forecast body with three days.
pub fn daily_forecast() -> serde_json::Value {
    serde_json::json!({
        "city": {"name": "Amsterdam"},
        "cnt": 3,
        "list": [
            {"dt": 1583056800, "temp": {"day": 7.0, "min": 3.04, "max": 9.46}, "weather": [{"description": "light rain"}]},
            {"dt": 1583143200, "temp": {"day": 5.0, "min": -1.26, "max": 7.0}, "weather": [{"description": "snow"}]},
            {"dt": 1583229600, "temp": {"day": 9.0, "min": 4.0, "max": 11.96}, "weather": [{"description": "clear sky"}]}
        ]
    })
}

/// Three-hourly forecast body with two entries.
pub fn three_hourly_forecast() -> serde_json::Value {
    serde_json::json!({
        "cnt": 2,
        "list": [
            {"dt": 1583031600, "main": {"temp": 8.0, "temp_min": 7.5, "temp_max": 8.5}, "weather": [{"description": "overcast clouds"}]},
            {"dt": 1583042400, "main": {"temp": 6.0, "temp_min": 5.25, "temp_max": 6.75}, "weather": [{"description": "broken clouds"}]}
        ]
    })
}

/// Client pointed at a mock server.
pub fn client_for(server: &MockServer, kind: ForecastKind) -> OpenWeatherMapClient {
    client_with_timeout(server, kind, Duration::from_secs(2))
}

/// Client pointed at a mock server with a custom request timeout.
pub fn client_with_timeout(
    server: &MockServer,
    kind: ForecastKind,
    timeout: Duration,
) -> OpenWeatherMapClient {
    OpenWeatherMapClient::new(API_KEY, server.uri(), timeout, kind)
        .expect("Failed to build client")
}
