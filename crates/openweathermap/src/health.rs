use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Spawn a background task that publishes node liveness heartbeats.
///
/// Publishes `"ok"` to `key` every `period`. Stops when the shutdown
/// signal fires. This is the liveness of the publisher process; the
/// per-location health lives under each location's `status` key.
pub async fn spawn_heartbeat(
    session: Arc<zenoh::Session>,
    key: String,
    period: Duration,
    mut shutdown_rx: watch::Receiver<()>,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    log::info!("Heartbeat: {} every {:?}", key, period);
    let publisher = session
        .declare_publisher(key)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create heartbeat publisher: {}", e))?;

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    log::debug!("Heartbeat stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = publisher.put("ok").await {
                        log::warn!("Heartbeat failed: {}", e);
                    }
                }
            }
        }
    });

    Ok(handle)
}
