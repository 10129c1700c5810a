use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
};
use serde::Deserialize;
use serde_json::Value;

use common::error::{ApiError, StoreError};
use common::store::{RowKey, Table};

use crate::core::state::GatewayState;

// Metadata store service. Storage nodes reach the registry and the catalog
// through these routes (see `common::remote_store::RemoteStore`).

#[derive(Debug, Deserialize)]
pub struct ItemQuery {
    pub partition: String,
    #[serde(default)]
    pub sort: Option<String>,
}

impl ItemQuery {
    fn row_key(self) -> RowKey {
        RowKey {
            partition: self.partition,
            sort: self.sort,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PartitionQuery {
    pub partition: String,
}

pub fn meta_router() -> Router<GatewayState> {
    Router::new()
        .route(
            "/meta/{table}/item",
            get(get_item).put(put_item).delete(delete_item),
        )
        .route("/meta/{table}/query", get(query_partition))
        .route("/meta/{table}/scan", get(scan_table))
}

fn parse_table(raw: &str) -> Result<Table, ApiError> {
    raw.parse::<Table>()
        .map_err(|e: StoreError| ApiError::InvalidRequest(e.to_string()))
}

#[tracing::instrument(name = "gateway.meta.get", skip(ctx))]
pub async fn get_item(
    State(ctx): State<GatewayState>,
    Path(table): Path<String>,
    Query(q): Query<ItemQuery>,
) -> Result<Json<Value>, ApiError> {
    let table = parse_table(&table)?;
    ctx.store
        .get(table, &q.row_key())
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{table} row")))
}

#[tracing::instrument(name = "gateway.meta.put", skip(ctx, value))]
pub async fn put_item(
    State(ctx): State<GatewayState>,
    Path(table): Path<String>,
    Query(q): Query<ItemQuery>,
    Json(value): Json<Value>,
) -> Result<StatusCode, ApiError> {
    let table = parse_table(&table)?;
    ctx.store.put(table, &q.row_key(), value).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(name = "gateway.meta.delete", skip(ctx))]
pub async fn delete_item(
    State(ctx): State<GatewayState>,
    Path(table): Path<String>,
    Query(q): Query<ItemQuery>,
) -> Result<StatusCode, ApiError> {
    let table = parse_table(&table)?;
    ctx.store.delete(table, &q.row_key()).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[tracing::instrument(name = "gateway.meta.query", skip(ctx))]
pub async fn query_partition(
    State(ctx): State<GatewayState>,
    Path(table): Path<String>,
    Query(q): Query<PartitionQuery>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let table = parse_table(&table)?;
    Ok(Json(ctx.store.query(table, &q.partition).await?))
}

#[tracing::instrument(name = "gateway.meta.scan", skip(ctx))]
pub async fn scan_table(
    State(ctx): State<GatewayState>,
    Path(table): Path<String>,
) -> Result<Json<Vec<Value>>, ApiError> {
    let table = parse_table(&table)?;
    Ok(Json(ctx.store.scan(table).await?))
}
