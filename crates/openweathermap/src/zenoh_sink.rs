//! Zenoh-backed telemetry sink.
//!
//! Key layout under `{zone}/{publisher_id}`:
//! - `{city}/value/{type}/{instance}`: latest value (JSON)
//! - `{city}/forecast/{type}/{instance}`: full forecast series (JSON array)
//! - `{city}/status`: location health (JSON)
//! - `{city}/outputs`: outputs the location provides (JSON)
//! - `discovery`: queryable answering with every location's outputs
//! - `health`: node liveness heartbeat

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use zenoh::Session;

use crate::config::Location;
use crate::sink::{
    now_timestamp, Channel, ForecastSeries, HealthStatus, LocationDiscovery, PublishResult,
    TelemetrySink,
};

/// Turn a city name into a single key expression chunk.
///
/// Lower-cases and replaces anything that is not ASCII alphanumeric with
/// `_`, so names like "São Paulo" or "Washington, D.C." stay one chunk.
pub fn location_key(name: &str) -> String {
    let key: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if key.is_empty() {
        "_".to_string()
    } else {
        key
    }
}

/// Key expressions for the weather publisher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keys {
    base: String,
}

impl Keys {
    pub fn new(zone: &str, publisher_id: &str) -> Self {
        Self {
            base: format!("{}/{}", zone, publisher_id),
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn value(&self, location: &Location, channel: Channel) -> String {
        format!(
            "{}/{}/value/{}/{}",
            self.base,
            location_key(&location.name),
            channel.output_type,
            channel.instance
        )
    }

    pub fn forecast(&self, location: &Location, channel: Channel) -> String {
        format!(
            "{}/{}/forecast/{}/{}",
            self.base,
            location_key(&location.name),
            channel.output_type,
            channel.instance
        )
    }

    pub fn status(&self, location: &Location) -> String {
        format!("{}/{}/status", self.base, location_key(&location.name))
    }

    pub fn outputs(&self, city: &str) -> String {
        format!("{}/{}/outputs", self.base, location_key(city))
    }

    pub fn discovery(&self) -> String {
        format!("{}/discovery", self.base)
    }

    pub fn heartbeat(&self) -> String {
        format!("{}/health", self.base)
    }
}

#[derive(Debug, Serialize)]
struct ValuePayload<'a> {
    city: &'a str,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<&'static str>,
    timestamp: String,
}

#[derive(Debug, Serialize)]
struct StatusPayload<'a> {
    city: &'a str,
    #[serde(flatten)]
    status: &'a HealthStatus,
    timestamp: String,
}

/// Publishes cycle results on a shared Zenoh session.
pub struct ZenohSink {
    session: Arc<Session>,
    keys: Keys,
}

impl ZenohSink {
    pub fn new(session: Arc<Session>, keys: Keys) -> Self {
        Self { session, keys }
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }

    async fn put_json<T>(&self, key: &str, payload: &T) -> PublishResult<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let bytes = serde_json::to_vec(payload)?;
        self.session.put(key, bytes).await?;
        Ok(())
    }

    /// Answer a discovery query with the given documents.
    pub async fn reply_discovery(
        &self,
        query: &zenoh::query::Query,
        discovery: &[LocationDiscovery],
    ) -> PublishResult<()> {
        log::debug!("Discovery query on {}", query.key_expr());
        let bytes = serde_json::to_vec(discovery)?;
        query.reply(query.key_expr(), bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl TelemetrySink for ZenohSink {
    async fn update_output_value(
        &self,
        location: &Location,
        channel: Channel,
        value: String,
    ) -> PublishResult<()> {
        let payload = ValuePayload {
            city: &location.name,
            value: &value,
            unit: channel.output_type.unit(),
            timestamp: now_timestamp(),
        };
        self.put_json(&self.keys.value(location, channel), &payload)
            .await
    }

    async fn set_health_status(
        &self,
        location: &Location,
        status: HealthStatus,
    ) -> PublishResult<()> {
        let payload = StatusPayload {
            city: &location.name,
            status: &status,
            timestamp: now_timestamp(),
        };
        self.put_json(&self.keys.status(location), &payload).await
    }

    async fn update_forecast_series(
        &self,
        location: &Location,
        channel: Channel,
        series: ForecastSeries,
    ) -> PublishResult<()> {
        self.put_json(&self.keys.forecast(location, channel), &series)
            .await
    }

    async fn announce_location(&self, discovery: &LocationDiscovery) -> PublishResult<()> {
        log::info!(
            "Announcing {} ({} outputs) on {}",
            discovery.city,
            discovery.outputs.len(),
            self.keys.outputs(&discovery.city)
        );
        self.put_json(&self.keys.outputs(&discovery.city), discovery)
            .await
    }
}
