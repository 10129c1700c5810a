use async_trait::async_trait;
use rocksdb::{DB, Direction, IteratorMode, Options, WriteOptions};
use serde_json::Value;
use std::{path::Path, sync::Arc};

use crate::error::StoreError;
use crate::key_utils::encode_component;
use crate::store::{MetaStore, RowKey, Table};

const MAX_OPEN_FILES: i32 = 512;

/// RocksDB-backed metadata store. Keys are laid out as
/// `{table}:{partition}/{sort}` with both components percent-encoded, so a
/// partition query is a forward prefix scan.
#[derive(Clone)]
pub struct KvDb {
    inner: Arc<DB>,
}

impl KvDb {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_level_compaction_dynamic_level_bytes(true);
        opts.set_max_open_files(MAX_OPEN_FILES);
        opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
        opts.set_write_buffer_size(64 * 1024 * 1024);
        opts.set_max_background_jobs(4);

        let db = DB::open(&opts, path)?;
        Ok(Self {
            inner: Arc::new(db),
        })
    }

    fn row_key(table: Table, key: &RowKey) -> String {
        format!(
            "{}{}",
            Self::partition_prefix(table, &key.partition),
            encode_component(key.sort.as_deref().unwrap_or_default())
        )
    }

    fn partition_prefix(table: Table, partition: &str) -> String {
        format!("{}:{}/", table.name(), encode_component(partition))
    }

    fn table_prefix(table: Table) -> String {
        format!("{}:", table.name())
    }

    fn collect_prefix(&self, prefix: &str) -> Result<Vec<Value>, StoreError> {
        let mut out = Vec::new();
        let iter = self
            .inner
            .iterator(IteratorMode::From(prefix.as_bytes(), Direction::Forward));
        for kv in iter {
            let (k, v) = kv?;
            if !k.starts_with(prefix.as_bytes()) {
                break;
            }
            out.push(serde_json::from_slice(&v)?);
        }
        Ok(out)
    }
}

#[async_trait]
impl MetaStore for KvDb {
    async fn put(&self, table: Table, key: &RowKey, value: Value) -> Result<(), StoreError> {
        let buf = serde_json::to_vec(&value)?;
        let mut write_opts = WriteOptions::default();
        write_opts.set_sync(true);
        self.inner
            .put_opt(Self::row_key(table, key).as_bytes(), buf, &write_opts)?;
        Ok(())
    }

    async fn get(&self, table: Table, key: &RowKey) -> Result<Option<Value>, StoreError> {
        match self.inner.get(Self::row_key(table, key).as_bytes())? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    async fn query(&self, table: Table, partition: &str) -> Result<Vec<Value>, StoreError> {
        self.collect_prefix(&Self::partition_prefix(table, partition))
    }

    async fn scan(&self, table: Table) -> Result<Vec<Value>, StoreError> {
        self.collect_prefix(&Self::table_prefix(table))
    }

    async fn delete(&self, table: Table, key: &RowKey) -> Result<(), StoreError> {
        self.inner.delete(Self::row_key(table, key).as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[tokio::test]
    async fn query_only_returns_rows_of_the_partition() {
        let dir = TempDir::new().unwrap();
        let db = KvDb::open(dir.path()).unwrap();

        db.put(Table::Chunks, &RowKey::sorted("f1", "0#a"), json!({"i": 0}))
            .await
            .unwrap();
        db.put(Table::Chunks, &RowKey::sorted("f1", "1#a"), json!({"i": 1}))
            .await
            .unwrap();
        // "f10" shares a textual prefix with "f1" but is a different partition
        db.put(Table::Chunks, &RowKey::sorted("f10", "0#a"), json!({"i": 10}))
            .await
            .unwrap();
        db.put(Table::Nodes, &RowKey::new("f1"), json!({"node": true}))
            .await
            .unwrap();

        let rows = db.query(Table::Chunks, "f1").await.unwrap();
        assert_eq!(rows, vec![json!({"i": 0}), json!({"i": 1})]);

        assert_eq!(db.scan(Table::Chunks).await.unwrap().len(), 3);
        assert_eq!(db.scan(Table::Nodes).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn put_overwrites_and_delete_removes() {
        let dir = TempDir::new().unwrap();
        let db = KvDb::open(dir.path()).unwrap();
        let key = RowKey::new("node-1");

        db.put(Table::Nodes, &key, json!({"v": 1})).await.unwrap();
        db.put(Table::Nodes, &key, json!({"v": 2})).await.unwrap();
        assert_eq!(db.get(Table::Nodes, &key).await.unwrap(), Some(json!({"v": 2})));

        db.delete(Table::Nodes, &key).await.unwrap();
        assert_eq!(db.get(Table::Nodes, &key).await.unwrap(), None);
    }
}
