use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;

use crate::error::StoreError;
use crate::store::{MetaStore, RowKey, Table};
use crate::trace_middleware::inject_trace_context_reqwest;

/// Metadata store reached over HTTP through the gateway's `/meta` service.
/// Storage nodes use this so that every process shares one registry and catalog.
#[derive(Clone)]
pub struct RemoteStore {
    http_client: Client,
    base_url: String,
}

impl RemoteStore {
    pub fn new(http_client: Client, gateway_url: &str) -> Self {
        Self {
            http_client,
            base_url: gateway_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, table: Table, op: &str) -> String {
        format!("{}/meta/{}/{}", self.base_url, table.name(), op)
    }

    fn key_query(key: &RowKey) -> Vec<(&'static str, &str)> {
        let mut q = vec![("partition", key.partition.as_str())];
        if let Some(sort) = key.sort.as_deref() {
            q.push(("sort", sort));
        }
        q
    }

    fn check(status: StatusCode) -> Result<(), StoreError> {
        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::RemoteStatus(status))
        }
    }
}

#[async_trait]
impl MetaStore for RemoteStore {
    async fn put(&self, table: Table, key: &RowKey, value: Value) -> Result<(), StoreError> {
        let req = self
            .http_client
            .put(self.url(table, "item"))
            .query(&Self::key_query(key))
            .json(&value);
        let resp = inject_trace_context_reqwest(req).send().await?;
        Self::check(resp.status())
    }

    async fn get(&self, table: Table, key: &RowKey) -> Result<Option<Value>, StoreError> {
        let req = self
            .http_client
            .get(self.url(table, "item"))
            .query(&Self::key_query(key));
        let resp = inject_trace_context_reqwest(req).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::check(resp.status())?;
        Ok(Some(resp.json::<Value>().await?))
    }

    async fn query(&self, table: Table, partition: &str) -> Result<Vec<Value>, StoreError> {
        let req = self
            .http_client
            .get(self.url(table, "query"))
            .query(&[("partition", partition)]);
        let resp = inject_trace_context_reqwest(req).send().await?;
        Self::check(resp.status())?;
        Ok(resp.json::<Vec<Value>>().await?)
    }

    async fn scan(&self, table: Table) -> Result<Vec<Value>, StoreError> {
        let req = self.http_client.get(self.url(table, "scan"));
        let resp = inject_trace_context_reqwest(req).send().await?;
        Self::check(resp.status())?;
        Ok(resp.json::<Vec<Value>>().await?)
    }

    async fn delete(&self, table: Table, key: &RowKey) -> Result<(), StoreError> {
        let req = self
            .http_client
            .delete(self.url(table, "item"))
            .query(&Self::key_query(key));
        let resp = inject_trace_context_reqwest(req).send().await?;
        Self::check(resp.status())
    }
}
