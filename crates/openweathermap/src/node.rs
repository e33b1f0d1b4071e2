//! Weather node: wires the OpenWeatherMap client, the Zenoh sink and the
//! sync cycle together and drives the cycle on its schedules.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::api::OpenWeatherMapClient;
use crate::config::Config;
use crate::cycle::{CycleSummary, WeatherSyncCycle};
use crate::error::NodeError;
use crate::sink::LocationDiscovery;
use crate::zenoh_sink::{Keys, ZenohSink};

pub struct WeatherNode {
    session: Arc<zenoh::Session>,
    sink: Arc<ZenohSink>,
    cycle: WeatherSyncCycle<OpenWeatherMapClient, ZenohSink>,
    current_interval: Duration,
    forecast_interval: Option<Duration>,
    heartbeat_interval: Duration,
}

impl WeatherNode {
    pub fn new(session: Arc<zenoh::Session>, config: &Config) -> Result<Self, NodeError> {
        config.validate()?;
        let client = OpenWeatherMapClient::from_config(config)
            .map_err(|e| NodeError::Init(format!("Failed to create HTTP client: {}", e)))?;
        let keys = Keys::new(&config.zone, &config.publisher_id);
        let sink = Arc::new(ZenohSink::new(session.clone(), keys));
        let cycle = WeatherSyncCycle::new(Arc::new(client), sink.clone(), config.locations())
            .with_forecast(config.forecast.enabled);

        Ok(Self {
            session,
            sink,
            cycle,
            current_interval: config.current_interval(),
            forecast_interval: config
                .forecast
                .enabled
                .then(|| config.forecast_interval()),
            heartbeat_interval: config.heartbeat_interval(),
        })
    }

    pub fn keys(&self) -> &Keys {
        self.sink.keys()
    }

    /// Run every pass once and return.
    pub async fn run_once(&self) -> (CycleSummary, Option<CycleSummary>) {
        self.announce().await;
        let current = self.cycle.run_current().await;
        let forecast = match self.forecast_interval {
            Some(_) => Some(self.cycle.run_forecast().await),
            None => None,
        };
        (current, forecast)
    }

    /// Run until the shutdown signal fires.
    ///
    /// Both intervals tick immediately, so the first passes start at
    /// startup. A pass in flight is abandoned on shutdown.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<()>) -> Result<(), NodeError> {
        log::info!(
            "Publishing {} location(s) under {} (current every {:?}, forecast {})",
            self.cycle.locations().len(),
            self.keys().base(),
            self.current_interval,
            self.forecast_interval
                .map(|d| format!("every {:?}", d))
                .unwrap_or_else(|| "disabled".to_string())
        );

        let heartbeat = crate::health::spawn_heartbeat(
            self.session.clone(),
            self.keys().heartbeat(),
            self.heartbeat_interval,
            shutdown_rx.clone(),
        )
        .await
        .map_err(|e| NodeError::Init(e.to_string()))?;

        let discovery_key = self.keys().discovery();
        let queryable = self
            .session
            .declare_queryable(&discovery_key)
            .await
            .map_err(|e| NodeError::Zenoh(format!("Failed to declare discovery queryable: {}", e)))?;
        log::info!("Discovery queryable: {}", discovery_key);

        self.announce().await;
        let discovery = self.discovery();

        let mut current_tick = tokio::time::interval(self.current_interval);
        current_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Period is irrelevant when the forecast pass is disabled; the
        // branch below is never polled.
        let forecast_enabled = self.forecast_interval.is_some();
        let mut forecast_tick =
            tokio::time::interval(self.forecast_interval.unwrap_or(self.current_interval));
        forecast_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::info!("Shutdown requested");
                    break;
                }
                query = queryable.recv_async() => match query {
                    Ok(query) => {
                        if let Err(e) = self.sink.reply_discovery(&query, &discovery).await {
                            log::warn!("Failed to answer discovery query: {}", e);
                        }
                    }
                    Err(e) => {
                        log::warn!("Discovery queryable closed: {}", e);
                        break;
                    }
                },
                _ = current_tick.tick() => {
                    let mut rx = shutdown_rx.clone();
                    tokio::select! {
                        _ = self.cycle.run_current() => {}
                        _ = rx.changed() => {
                            log::info!("Shutdown during current pass");
                            break;
                        }
                    }
                }
                _ = forecast_tick.tick(), if forecast_enabled => {
                    let mut rx = shutdown_rx.clone();
                    tokio::select! {
                        _ = self.cycle.run_forecast() => {}
                        _ = rx.changed() => {
                            log::info!("Shutdown during forecast pass");
                            break;
                        }
                    }
                }
            }
        }

        heartbeat.abort();
        drop(queryable);
        log::info!("Weather node stopped");
        Ok(())
    }

    pub fn discovery(&self) -> Vec<LocationDiscovery> {
        self.cycle.discovery()
    }

    async fn announce(&self) {
        let failed = self.cycle.announce().await;
        if failed > 0 {
            log::warn!("{} location announcement(s) failed", failed);
        }
    }
}
