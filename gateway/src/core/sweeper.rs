use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use common::error::StoreError;
use common::registry::NodeRegistry;
use common::time_utils::utc_now_secs;

/// Deletes registry rows whose last heartbeat is older than `ttl_secs`.
/// Returns the removed node ids.
pub async fn prune_stale_nodes(
    registry: &NodeRegistry,
    ttl_secs: i64,
) -> Result<Vec<String>, StoreError> {
    let now = utc_now_secs();
    let mut removed = Vec::new();

    for node in registry.list_all().await? {
        if now - node.heartbeat_timestamp > ttl_secs {
            registry.remove(&node.node_id).await?;
            removed.push(node.node_id);
        }
    }

    Ok(removed)
}

/// Periodically prunes nodes that stopped heartbeating long ago. Liveness
/// itself never depends on this loop; it only keeps the registry small.
pub async fn node_ttl_sweeper(
    registry: NodeRegistry,
    ttl: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);
    let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        match prune_stale_nodes(&registry, ttl_secs).await {
            Ok(removed) if !removed.is_empty() => {
                info!(?removed, "pruned stale nodes");
            }
            Ok(_) => {}
            Err(e) => warn!("node ttl sweep failed: {e}"),
        }
    }

    info!("node ttl sweeper stopped");

    Ok(())
}
