use std::sync::Arc;

/// Default Zenoh router endpoint.
pub const DEFAULT_ENDPOINT: &str = "tcp/127.0.0.1:7447";

/// Resolve the Zenoh endpoint.
///
/// Resolution order:
/// 1. `ZENOH_ENDPOINT` env var
/// 2. Provided `endpoint` argument
/// 3. Default: `tcp/127.0.0.1:7447`
pub fn resolve_endpoint(endpoint: Option<&str>) -> String {
    std::env::var("ZENOH_ENDPOINT")
        .ok()
        .filter(|e| !e.trim().is_empty())
        .or_else(|| endpoint.map(str::to_string))
        .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string())
}

/// Open a Zenoh session in client mode.
pub async fn open_zenoh_session(endpoint: Option<&str>) -> anyhow::Result<Arc<zenoh::Session>> {
    let endpoint = resolve_endpoint(endpoint);
    log::info!("Connecting to Zenoh at: {}", endpoint);

    let mut config = zenoh::Config::default();
    // Client mode: values are routed through the zenohd router
    config
        .insert_json5("mode", r#""client""#)
        .map_err(|e| anyhow::anyhow!("Failed to set Zenoh mode: {}", e))?;
    config
        .insert_json5("connect/endpoints", &format!(r#"["{}"]"#, endpoint))
        .map_err(|e| anyhow::anyhow!("Failed to set Zenoh endpoint: {}", e))?;
    config
        .insert_json5("scouting/multicast/enabled", "false")
        .map_err(|e| anyhow::anyhow!("Failed to disable multicast: {}", e))?;
    config
        .insert_json5("scouting/gossip/enabled", "false")
        .map_err(|e| anyhow::anyhow!("Failed to disable gossip: {}", e))?;

    let session = zenoh::open(config)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open Zenoh session: {}", e))?;

    log::info!("Connected to Zenoh");
    Ok(Arc::new(session))
}
