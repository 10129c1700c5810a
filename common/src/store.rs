use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Display;
use std::str::FromStr;

use crate::error::StoreError;

/// Logical tables hosted by a metadata store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Nodes,
    Chunks,
    ChunksByNode,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Nodes => "node",
            Table::Chunks => "chunk",
            Table::ChunksByNode => "chunk_by_node",
        }
    }
}

impl Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Table {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "node" => Ok(Table::Nodes),
            "chunk" => Ok(Table::Chunks),
            "chunk_by_node" => Ok(Table::ChunksByNode),
            other => Err(StoreError::UnknownTable(other.to_string())),
        }
    }
}

/// Partition key plus optional sort key. Rows sharing a partition are
/// returned together by [`MetaStore::query`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowKey {
    pub partition: String,
    pub sort: Option<String>,
}

impl RowKey {
    pub fn new(partition: impl Into<String>) -> Self {
        Self { partition: partition.into(), sort: None }
    }

    pub fn sorted(partition: impl Into<String>, sort: impl Into<String>) -> Self {
        Self { partition: partition.into(), sort: Some(sort.into()) }
    }
}

/// Keyed store backing the node registry and the chunk catalog.
#[async_trait]
pub trait MetaStore: Send + Sync {
    async fn put(&self, table: Table, key: &RowKey, value: Value) -> Result<(), StoreError>;

    async fn get(&self, table: Table, key: &RowKey) -> Result<Option<Value>, StoreError>;

    async fn query(&self, table: Table, partition: &str) -> Result<Vec<Value>, StoreError>;

    async fn scan(&self, table: Table) -> Result<Vec<Value>, StoreError>;

    async fn delete(&self, table: Table, key: &RowKey) -> Result<(), StoreError>;
}
