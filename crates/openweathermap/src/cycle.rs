//! The weather update cycle.
//!
//! One pass walks the configured locations in order, fetches from the
//! [`WeatherSource`], and writes the normalized outputs and per-location
//! health to the [`TelemetrySink`]. A failing location is reported and
//! skipped; it never stops the pass.

use std::sync::Arc;
use std::time::Instant;

use crate::api::{ApiError, CurrentReading, ForecastPoint, WeatherSource};
use crate::config::Location;
use crate::sink::{
    format_epoch, Channel, ForecastSeries, ForecastValue, HealthStatus, LocationDiscovery,
    TelemetrySink, CURRENT_CHANNELS, FORECAST_CHANNELS,
};

/// Rain and snow are published at this multiple of the reported value.
pub const PRECIPITATION_SCALE: f64 = 1000.0;

/// Outcome of one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleSummary {
    /// Locations that ended the pass Ready
    pub ready: usize,
    /// Locations that ended the pass in Error
    pub failed: usize,
    /// Sink calls that failed
    pub publish_errors: usize,
}

impl CycleSummary {
    pub fn total(&self) -> usize {
        self.ready + self.failed
    }
}

/// Orchestrates the current-weather and forecast passes.
pub struct WeatherSyncCycle<W, S> {
    source: Arc<W>,
    sink: Arc<S>,
    locations: Vec<Location>,
    forecast_enabled: bool,
}

impl<W: WeatherSource, S: TelemetrySink> WeatherSyncCycle<W, S> {
    pub fn new(source: Arc<W>, sink: Arc<S>, locations: Vec<Location>) -> Self {
        Self {
            source,
            sink,
            locations,
            forecast_enabled: false,
        }
    }

    /// Include the forecast channels in [`announce`](Self::announce).
    pub fn with_forecast(mut self, enabled: bool) -> Self {
        self.forecast_enabled = enabled;
        self
    }

    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Discovery documents for all locations.
    pub fn discovery(&self) -> Vec<LocationDiscovery> {
        self.locations
            .iter()
            .map(|location| {
                let mut outputs = CURRENT_CHANNELS.to_vec();
                if self.forecast_enabled {
                    outputs.extend_from_slice(&FORECAST_CHANNELS);
                }
                LocationDiscovery {
                    city: location.name.clone(),
                    language: location.language.clone(),
                    outputs,
                }
            })
            .collect()
    }

    /// Announce every location and the outputs it provides.
    pub async fn announce(&self) -> usize {
        let mut publish_errors = 0;
        for discovery in self.discovery() {
            if let Err(e) = self.sink.announce_location(&discovery).await {
                log::warn!("Failed to announce {}: {}", discovery.city, e);
                publish_errors += 1;
            }
        }
        publish_errors
    }

    /// Fetch and publish the current weather for every location.
    pub async fn run_current(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for location in &self.locations {
            let started = Instant::now();
            match self.source.fetch_current(location).await {
                Ok(reading) => {
                    let latency_ms = started.elapsed().as_millis() as u64;
                    if !reading.city.is_empty() && reading.city != location.name {
                        log::debug!("{} reported as {}", location.name, reading.city);
                    }
                    let status = HealthStatus::ready(Some(latency_ms)).observed(reading.timestamp);
                    self.set_health(location, status, &mut summary).await;
                    for (channel, value) in current_outputs(&reading) {
                        log::debug!(
                            "{} {}/{} = {}",
                            location.name,
                            channel.output_type,
                            channel.instance,
                            value
                        );
                        if let Err(e) = self
                            .sink
                            .update_output_value(location, channel, value)
                            .await
                        {
                            log::warn!(
                                "Failed to publish {}/{} for {}: {}",
                                channel.output_type,
                                channel.instance,
                                location.name,
                                e
                            );
                            summary.publish_errors += 1;
                        }
                    }
                    summary.ready += 1;
                }
                Err(e) => {
                    log::warn!("Current weather for {} not available: {}", location.name, e);
                    let status =
                        HealthStatus::error(format!("Current weather not available: {}", e));
                    self.set_health(location, status, &mut summary).await;
                    summary.failed += 1;
                }
            }
        }

        log::info!(
            "Current weather pass: {}/{} locations ready",
            summary.ready,
            summary.total()
        );
        summary
    }

    /// Fetch and publish the forecast series for every location.
    pub async fn run_forecast(&self) -> CycleSummary {
        let mut summary = CycleSummary::default();

        for location in &self.locations {
            let started = Instant::now();
            let points = match self.source.fetch_forecast(location).await {
                Ok(points) if points.is_empty() => Err(ApiError::EmptyForecast),
                other => other,
            };

            let points = match points {
                Ok(points) => points,
                Err(ApiError::EmptyForecast) => {
                    log::warn!("Forecast for {} not provided", location.name);
                    let status = HealthStatus::error("Forecast not provided");
                    self.set_health(location, status, &mut summary).await;
                    summary.failed += 1;
                    continue;
                }
                Err(e) => {
                    log::warn!("Forecast for {} not available: {}", location.name, e);
                    let status = HealthStatus::error(format!("Forecast not available: {}", e));
                    self.set_health(location, status, &mut summary).await;
                    summary.failed += 1;
                    continue;
                }
            };

            let latency_ms = started.elapsed().as_millis() as u64;
            let status = HealthStatus::ready(Some(latency_ms));
            self.set_health(location, status, &mut summary).await;

            for (channel, series) in forecast_series(&points) {
                if let Err(e) = self
                    .sink
                    .update_forecast_series(location, channel, series)
                    .await
                {
                    log::warn!(
                        "Failed to publish forecast {}/{} for {}: {}",
                        channel.output_type,
                        channel.instance,
                        location.name,
                        e
                    );
                    summary.publish_errors += 1;
                }
            }
            summary.ready += 1;
        }

        log::info!(
            "Forecast pass: {}/{} locations ready",
            summary.ready,
            summary.total()
        );
        summary
    }

    async fn set_health(
        &self,
        location: &Location,
        status: HealthStatus,
        summary: &mut CycleSummary,
    ) {
        if let Err(e) = self.sink.set_health_status(location, status).await {
            log::warn!("Failed to publish status for {}: {}", location.name, e);
            summary.publish_errors += 1;
        }
    }
}

/// Map a reading onto the current channels, one value per channel.
pub fn current_outputs(reading: &CurrentReading) -> Vec<(Channel, String)> {
    let values = [
        reading.description.clone(),
        format!("{:.1}", reading.temperature),
        format!("{}", reading.humidity),
        format!("{:.0}", reading.pressure),
        format!("{:.1}", reading.wind_speed),
        format!("{:.0}", reading.wind_heading),
        format!("{:.1}", reading.rain_last_hour * PRECIPITATION_SCALE),
        format!("{:.1}", reading.snow_last_hour * PRECIPITATION_SCALE),
    ];
    CURRENT_CHANNELS.into_iter().zip(values).collect()
}

/// Split forecast points into the weather, max and min series.
///
/// The three series have the same length and timestamps as `points`.
pub fn forecast_series(points: &[ForecastPoint]) -> Vec<(Channel, ForecastSeries)> {
    let mut weather = Vec::with_capacity(points.len());
    let mut max_temp = Vec::with_capacity(points.len());
    let mut min_temp = Vec::with_capacity(points.len());

    for point in points {
        let timestamp = format_epoch(point.epoch);
        let entry = |value: String| ForecastValue {
            timestamp: timestamp.clone(),
            epoch: point.epoch,
            value,
        };
        weather.push(entry(point.description.clone()));
        max_temp.push(entry(format!("{:.1}", point.temp_max)));
        min_temp.push(entry(format!("{:.1}", point.temp_min)));
    }

    let [weather_channel, max_channel, min_channel] = FORECAST_CHANNELS;
    vec![
        (weather_channel, weather),
        (max_channel, max_temp),
        (min_channel, min_temp),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiResult;
    use crate::sink::mock::{RecordingSink, SinkEvent};
    use crate::sink::{OutputType, RunState, INSTANCE_CURRENT, INSTANCE_HOUR, INSTANCE_MAX};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    enum Canned {
        Current(CurrentReading),
        Forecast(Vec<ForecastPoint>),
        Auth,
        Missing,
        Empty,
    }

    /// Source returning canned results per city.
    #[derive(Default)]
    struct MockSource {
        current: HashMap<String, Canned>,
        forecast: HashMap<String, Canned>,
        calls: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn with_current(mut self, city: &str, canned: Canned) -> Self {
            self.current.insert(city.to_string(), canned);
            self
        }

        fn with_forecast(mut self, city: &str, canned: Canned) -> Self {
            self.forecast.insert(city.to_string(), canned);
            self
        }
    }

    fn answer<T>(canned: Option<&Canned>, pick: impl Fn(&Canned) -> Option<T>) -> ApiResult<T> {
        match canned {
            Some(Canned::Auth) => Err(ApiError::Auth { status: 401 }),
            Some(Canned::Empty) => Err(ApiError::EmptyForecast),
            Some(Canned::Missing) | None => Err(ApiError::Request {
                status: Some(404),
                message: "status 404: city not found".to_string(),
            }),
            Some(other) => pick(other).ok_or_else(|| ApiError::Decode("mock".to_string())),
        }
    }

    #[async_trait]
    impl WeatherSource for MockSource {
        async fn fetch_current(&self, location: &Location) -> ApiResult<CurrentReading> {
            self.calls.lock().unwrap().push(location.name.clone());
            answer(self.current.get(&location.name), |c| match c {
                Canned::Current(r) => Some(r.clone()),
                _ => None,
            })
        }

        async fn fetch_forecast(&self, location: &Location) -> ApiResult<Vec<ForecastPoint>> {
            self.calls.lock().unwrap().push(location.name.clone());
            answer(self.forecast.get(&location.name), |c| match c {
                Canned::Forecast(p) => Some(p.clone()),
                _ => None,
            })
        }
    }

    fn amsterdam() -> CurrentReading {
        CurrentReading {
            city: "Amsterdam".to_string(),
            temperature: 18.35,
            humidity: 65,
            pressure: 1013.2,
            wind_speed: 3.4,
            wind_heading: 270.0,
            rain_last_hour: 0.002,
            snow_last_hour: 0.0,
            description: "light rain".to_string(),
            timestamp: 1_583_020_800,
        }
    }

    fn locations(names: &[&str]) -> Vec<Location> {
        names.iter().map(|n| Location::new(*n, "en")).collect()
    }

    fn cycle(
        source: MockSource,
        names: &[&str],
    ) -> (WeatherSyncCycle<MockSource, RecordingSink>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let cycle = WeatherSyncCycle::new(Arc::new(source), sink.clone(), locations(names));
        (cycle, sink)
    }

    fn points() -> Vec<ForecastPoint> {
        vec![
            ForecastPoint {
                epoch: 1_583_020_800,
                description: "clear sky".to_string(),
                temp_max: 9.46,
                temp_min: 3.04,
            },
            ForecastPoint {
                epoch: 1_583_107_200,
                description: "light rain".to_string(),
                temp_max: 7.0,
                temp_min: -1.26,
            },
            ForecastPoint {
                epoch: 1_583_193_600,
                description: String::new(),
                temp_max: 11.96,
                temp_min: 4.0,
            },
        ]
    }

    #[test]
    fn current_outputs_formatting() {
        let outputs: HashMap<Channel, String> = current_outputs(&amsterdam()).into_iter().collect();
        let get = |t: OutputType, i: &'static str| outputs[&Channel::new(t, i)].clone();

        assert_eq!(get(OutputType::Weather, INSTANCE_CURRENT), "light rain");
        assert_eq!(get(OutputType::Temperature, INSTANCE_CURRENT), "18.4");
        assert_eq!(get(OutputType::Humidity, INSTANCE_CURRENT), "65");
        assert_eq!(get(OutputType::AtmosphericPressure, INSTANCE_CURRENT), "1013");
        assert_eq!(get(OutputType::WindSpeed, INSTANCE_CURRENT), "3.4");
        assert_eq!(get(OutputType::WindHeading, INSTANCE_CURRENT), "270");
        assert_eq!(get(OutputType::Rain, INSTANCE_HOUR), "2.0");
        assert_eq!(get(OutputType::Snow, INSTANCE_HOUR), "0.0");
    }

    #[test]
    fn current_outputs_cover_every_channel_once() {
        let outputs = current_outputs(&CurrentReading::default());
        assert_eq!(outputs.len(), CURRENT_CHANNELS.len());
        let channels: Vec<Channel> = outputs.iter().map(|(c, _)| *c).collect();
        assert_eq!(channels, CURRENT_CHANNELS.to_vec());
        // empty description is published as an empty string
        assert_eq!(outputs[0].1, "");
    }

    #[tokio::test]
    async fn run_current_publishes_eight_values_and_ready() {
        let source = MockSource::default().with_current("Amsterdam", Canned::Current(amsterdam()));
        let (cycle, sink) = cycle(source, &["Amsterdam"]);

        let summary = cycle.run_current().await;
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.publish_errors, 0);

        let values = sink.values_for("Amsterdam");
        assert_eq!(values.len(), 8);
        assert_eq!(
            sink.value("Amsterdam", Channel::new(OutputType::Temperature, INSTANCE_CURRENT)),
            Some("18.4".to_string())
        );

        let health = sink.health_for("Amsterdam");
        assert_eq!(health.len(), 1);
        assert!(health[0].is_ready());
        assert!(health[0].message.is_none());
        assert!(health[0].latency_ms.is_some());
        assert_eq!(
            health[0].observed_at.as_deref(),
            Some("2020-03-01T00:00:00.000+0000")
        );
    }

    #[tokio::test]
    async fn failed_location_does_not_stop_the_pass() {
        let source = MockSource::default()
            .with_current("Atlantis", Canned::Auth)
            .with_current("Amsterdam", Canned::Current(amsterdam()));
        let (cycle, sink) = cycle(source, &["Atlantis", "Amsterdam"]);

        let summary = cycle.run_current().await;
        assert_eq!(summary, CycleSummary { ready: 1, failed: 1, publish_errors: 0 });

        assert!(sink.values_for("Atlantis").is_empty());
        let health = sink.health_for("Atlantis");
        assert_eq!(health.len(), 1);
        assert_eq!(health[0].status, RunState::Error);
        let message = health[0].message.clone().unwrap();
        assert!(message.starts_with("Current weather not available"));
        assert!(message.contains("Invalid API key"));

        assert_eq!(sink.values_for("Amsterdam").len(), 8);
        assert!(sink.health_for("Amsterdam")[0].is_ready());
    }

    #[tokio::test]
    async fn locations_are_processed_in_config_order() {
        let source = MockSource::default()
            .with_current("B", Canned::Current(amsterdam()))
            .with_current("A", Canned::Current(amsterdam()));
        let source = Arc::new(source);
        let sink = Arc::new(RecordingSink::new());
        let cycle = WeatherSyncCycle::new(source.clone(), sink.clone(), locations(&["B", "C", "A"]));

        cycle.run_current().await;
        assert_eq!(*source.calls.lock().unwrap(), vec!["B", "C", "A"]);

        let order: Vec<String> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Health { city, .. } => Some(city),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec!["B", "C", "A"]);
    }

    #[tokio::test]
    async fn health_precedes_values() {
        let source = MockSource::default().with_current("Amsterdam", Canned::Current(amsterdam()));
        let (cycle, sink) = cycle(source, &["Amsterdam"]);
        cycle.run_current().await;
        assert!(matches!(sink.events()[0], SinkEvent::Health { .. }));
    }

    #[tokio::test]
    async fn run_current_twice_publishes_duplicates() {
        let source = MockSource::default().with_current("Amsterdam", Canned::Current(amsterdam()));
        let (cycle, sink) = cycle(source, &["Amsterdam"]);

        cycle.run_current().await;
        cycle.run_current().await;

        let values = sink.values_for("Amsterdam");
        assert_eq!(values.len(), 16);
        assert_eq!(values[..8], values[8..]);
    }

    #[tokio::test]
    async fn publish_failures_are_counted_not_fatal() {
        let source = MockSource::default()
            .with_current("A", Canned::Current(amsterdam()))
            .with_current("B", Canned::Current(amsterdam()));
        let sink = Arc::new(RecordingSink::failing());
        let cycle = WeatherSyncCycle::new(Arc::new(source), sink.clone(), locations(&["A", "B"]));

        let summary = cycle.run_current().await;
        assert_eq!(summary.ready, 2);
        assert_eq!(summary.publish_errors, 16);
        assert_eq!(sink.health_for("B").len(), 1);
    }

    #[test]
    fn forecast_series_are_aligned() {
        let series = forecast_series(&points());
        assert_eq!(series.len(), 3);
        assert_eq!(
            series.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
            FORECAST_CHANNELS.to_vec()
        );

        for (_, s) in &series {
            assert_eq!(s.len(), 3);
            assert_eq!(s[0].timestamp, "2020-03-01T00:00:00.000+0000");
            assert_eq!(s[1].epoch, 1_583_107_200);
        }

        let (_, weather) = &series[0];
        assert_eq!(weather[1].value, "light rain");
        assert_eq!(weather[2].value, "");

        let (_, max) = &series[1];
        let (_, min) = &series[2];
        assert_eq!(
            max.iter().map(|v| v.value.as_str()).collect::<Vec<_>>(),
            vec!["9.5", "7.0", "12.0"]
        );
        assert_eq!(
            min.iter().map(|v| v.value.as_str()).collect::<Vec<_>>(),
            vec!["3.0", "-1.3", "4.0"]
        );
    }

    #[tokio::test]
    async fn run_forecast_replaces_three_series() {
        let source = MockSource::default().with_forecast("Vancouver", Canned::Forecast(points()));
        let (cycle, sink) = cycle(source, &["Vancouver"]);

        let summary = cycle.run_forecast().await;
        assert_eq!(summary.ready, 1);

        let forecasts = sink.forecasts_for("Vancouver");
        assert_eq!(forecasts.len(), 3);
        assert!(forecasts.iter().all(|(_, s)| s.len() == 3));
        assert_eq!(forecasts[1].0, Channel::new(OutputType::Temperature, INSTANCE_MAX));
        assert!(sink.health_for("Vancouver")[0].is_ready());
        assert!(sink.values_for("Vancouver").is_empty());
    }

    #[tokio::test]
    async fn run_forecast_absent_list_is_not_provided() {
        let source = MockSource::default().with_forecast("Vancouver", Canned::Empty);
        let (cycle, sink) = cycle(source, &["Vancouver"]);

        let summary = cycle.run_forecast().await;
        assert_eq!(summary.failed, 1);
        assert!(sink.forecasts_for("Vancouver").is_empty());
        let health = sink.health_for("Vancouver");
        assert_eq!(health[0].status, RunState::Error);
        assert_eq!(health[0].message.as_deref(), Some("Forecast not provided"));
    }

    #[tokio::test]
    async fn run_forecast_empty_list_is_not_provided() {
        let source = MockSource::default().with_forecast("Vancouver", Canned::Forecast(vec![]));
        let (cycle, sink) = cycle(source, &["Vancouver"]);

        cycle.run_forecast().await;
        assert!(sink.forecasts_for("Vancouver").is_empty());
        assert_eq!(
            sink.health_for("Vancouver")[0].message.as_deref(),
            Some("Forecast not provided")
        );
    }

    #[tokio::test]
    async fn run_forecast_fetch_error_continues() {
        let source = MockSource::default()
            .with_forecast("Atlantis", Canned::Missing)
            .with_forecast("Vancouver", Canned::Forecast(points()));
        let (cycle, sink) = cycle(source, &["Atlantis", "Vancouver"]);

        let summary = cycle.run_forecast().await;
        assert_eq!(summary.ready, 1);
        assert_eq!(summary.failed, 1);

        let message = sink.health_for("Atlantis")[0].message.clone().unwrap();
        assert!(message.starts_with("Forecast not available"));
        assert!(message.contains("city not found"));
        assert_eq!(sink.forecasts_for("Vancouver").len(), 3);
    }

    #[tokio::test]
    async fn announce_lists_outputs() {
        let (cycle, sink) = cycle(MockSource::default(), &["Amsterdam", "Vancouver"]);
        let cycle = cycle.with_forecast(true);

        assert_eq!(cycle.announce().await, 0);
        let announced: Vec<LocationDiscovery> = sink
            .events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Announce(d) => Some(d),
                _ => None,
            })
            .collect();
        assert_eq!(announced.len(), 2);
        assert_eq!(announced[0].city, "Amsterdam");
        assert_eq!(announced[0].language, "en");
        assert_eq!(announced[0].outputs.len(), 11);
    }

    #[test]
    fn discovery_without_forecast_has_current_outputs_only() {
        let (cycle, _) = cycle(MockSource::default(), &["Amsterdam"]);
        let discovery = cycle.discovery();
        assert_eq!(discovery[0].outputs, CURRENT_CHANNELS.to_vec());
    }
}
