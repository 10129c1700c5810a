use std::sync::Arc;

use crate::error::StoreError;
use crate::model::{ChunkReplica, replica_key};
use crate::store::{MetaStore, RowKey, Table};

/// Chunk replica catalog. Rows are partitioned by `file_id` and sorted by
/// `chunk_index#node_id`; a second table indexes the same rows by node.
#[derive(Clone)]
pub struct ChunkCatalog {
    store: Arc<dyn MetaStore>,
}

impl ChunkCatalog {
    pub fn new(store: Arc<dyn MetaStore>) -> Self {
        Self { store }
    }

    fn node_sort_key(file_id: &str, replica_key: &str) -> String {
        format!("{}/{}", file_id, replica_key)
    }

    pub async fn put_replica(&self, replica: &ChunkReplica) -> Result<(), StoreError> {
        let mut row = replica.clone();
        row.replica_key = replica_key(row.chunk_index, &row.node_id);
        let value = serde_json::to_value(&row)?;

        self.store
            .put(
                Table::Chunks,
                &RowKey::sorted(&row.file_id, &row.replica_key),
                value.clone(),
            )
            .await?;
        self.store
            .put(
                Table::ChunksByNode,
                &RowKey::sorted(&row.node_id, Self::node_sort_key(&row.file_id, &row.replica_key)),
                value,
            )
            .await
    }

    /// Every replica of every chunk of the file.
    pub async fn replicas_for_file(&self, file_id: &str) -> Result<Vec<ChunkReplica>, StoreError> {
        decode_rows(self.store.query(Table::Chunks, file_id).await?)
    }

    pub async fn replicas_for_chunk(
        &self,
        file_id: &str,
        chunk_index: u64,
    ) -> Result<Vec<ChunkReplica>, StoreError> {
        Ok(self
            .replicas_for_file(file_id)
            .await?
            .into_iter()
            .filter(|r| r.chunk_index == chunk_index)
            .collect())
    }

    pub async fn replicas_on_node(&self, node_id: &str) -> Result<Vec<ChunkReplica>, StoreError> {
        decode_rows(self.store.query(Table::ChunksByNode, node_id).await?)
    }

    pub async fn delete_replica(
        &self,
        file_id: &str,
        chunk_index: u64,
        node_id: &str,
    ) -> Result<(), StoreError> {
        let key = replica_key(chunk_index, node_id);
        self.store
            .delete(Table::Chunks, &RowKey::sorted(file_id, &key))
            .await?;
        self.store
            .delete(
                Table::ChunksByNode,
                &RowKey::sorted(node_id, Self::node_sort_key(file_id, &key)),
            )
            .await
    }
}

fn decode_rows(rows: Vec<serde_json::Value>) -> Result<Vec<ChunkReplica>, StoreError> {
    rows.into_iter()
        .map(|v| serde_json::from_value(v).map_err(StoreError::from))
        .collect()
}
