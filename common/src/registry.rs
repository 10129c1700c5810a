use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{NodeRecord, NodeStatus};
use crate::store::{MetaStore, RowKey, Table};
use crate::time_utils::utc_now_secs;

/// Node registry over a [`MetaStore`]. Nodes are never marked dead: liveness is
/// derived from the heartbeat age whenever the registry is read.
#[derive(Clone)]
pub struct NodeRegistry {
    store: Arc<dyn MetaStore>,
}

impl NodeRegistry {
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    /// Upserts the record, stamping it active as of now.
    pub async fn register(&self, mut node: NodeRecord) -> Result<NodeRecord, StoreError> {
        node.heartbeat_timestamp = utc_now_secs();
        node.status = Some(NodeStatus::Active);
        self.put(&node).await?;
        Ok(node)
    }

    pub async fn heartbeat(&self, node_id: &str) -> Result<(), StoreError> {
        let mut node = self.get(node_id).await?;
        node.heartbeat_timestamp = utc_now_secs();
        node.status = Some(NodeStatus::Active);
        self.put(&node).await
    }

    pub async fn get(&self, node_id: &str) -> Result<NodeRecord, StoreError> {
        let raw = self
            .store
            .get(Table::Nodes, &RowKey::new(node_id))
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("node {node_id}")))?;
        Ok(serde_json::from_value(raw)?)
    }

    pub async fn list_all(&self) -> Result<Vec<NodeRecord>, StoreError> {
        self.store
            .scan(Table::Nodes)
            .await?
            .into_iter()
            .map(|v| serde_json::from_value(v).map_err(StoreError::from))
            .collect()
    }

    pub async fn list_active(&self, heartbeat_timeout: i64) -> Result<Vec<NodeRecord>, StoreError> {
        let now = utc_now_secs();
        Ok(self
            .list_all()
            .await?
            .into_iter()
            .filter(|n| n.is_active(now, heartbeat_timeout))
            .collect())
    }

    pub async fn remove(&self, node_id: &str) -> Result<(), StoreError> {
        self.store.delete(Table::Nodes, &RowKey::new(node_id)).await
    }

    /// Writes the record as-is, without touching the heartbeat stamp.
    pub async fn put(&self, node: &NodeRecord) -> Result<(), StoreError> {
        self.store
            .put(Table::Nodes, &RowKey::new(&node.node_id), serde_json::to_value(node)?)
            .await
    }
}
