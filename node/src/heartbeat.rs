use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

use common::error::StoreError;
use common::model::NodeRecord;

use crate::chunk_store::disk_space;
use crate::state::NodeState;

/// Upserts this node's full record, refreshing its free space.
pub async fn register_node(state: &NodeState) -> Result<NodeRecord, StoreError> {
    let mut record = state.record.clone();
    record.available_space = match disk_space(&state.data_root) {
        Ok((available, _)) => Some(available),
        Err(e) => {
            warn!("disk space lookup failed: {e:#}");
            None
        }
    };

    let record = state.registry.register(record).await?;
    info!(
        node_id = %record.node_id,
        address = %record.base_url(),
        available_space = ?record.available_space,
        "registered node"
    );
    Ok(record)
}

/// Refreshes the heartbeat every `interval` until `shutdown` flips to true.
/// Errors are logged and never end the loop; a node missing from the
/// registry registers itself again.
pub async fn heartbeat_loop(
    state: NodeState,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    let mut tick = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = tick.tick() => {},
            _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
        }

        match state.registry.heartbeat(&state.node_id).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => {
                warn!(node_id = %state.node_id, "node missing from registry, registering again");
                if let Err(e) = register_node(&state).await {
                    warn!("re-registration failed: {e}");
                }
            }
            Err(e) => {
                warn!("heartbeat error: {e}");
            }
        }
    }

    info!("heartbeat loop stopped");

    Ok(())
}
