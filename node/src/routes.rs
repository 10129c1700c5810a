use anyhow::anyhow;
use axum::{
    Json,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tokio_util::io::ReaderStream;
use tracing::info;

use common::constants::CHECKSUM_HEADER;
use common::error::ApiError;
use common::key_utils::validate_id;
use common::model::{ChunkReplica, ReplicaType};
use common::schemas::StoreChunkResponse;
use common::time_utils::utc_now_secs;

use crate::chunk_store::{open_chunk, remove_chunk, write_chunk};
use crate::state::NodeState;

#[derive(Deserialize, Debug)]
pub struct StoreChunkQuery {
    pub file_id: String,
    pub chunk_index: u64,
    #[serde(default)]
    pub replica_type: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ChunkQuery {
    pub file_id: String,
    pub chunk_index: u64,
}

fn parse_replica_type(raw: Option<&str>) -> Result<ReplicaType, ApiError> {
    match raw {
        None | Some("") => Ok(ReplicaType::Primary),
        Some(s) => s.parse().map_err(ApiError::InvalidRequest),
    }
}

fn expected_checksum(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(CHECKSUM_HEADER) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .map(|s| Some(s.trim().to_ascii_lowercase()))
            .map_err(|_| ApiError::InvalidRequest(format!("{CHECKSUM_HEADER} is not ascii"))),
    }
}

// PUT /store-chunk?file_id=&chunk_index=&replica_type=
/// Stores one chunk and records its replica row. A body that does not hash to
/// the supplied checksum is rejected before anything becomes visible.
#[tracing::instrument(name = "node.store_chunk", skip(ctx, headers, body))]
pub async fn store_chunk(
    State(ctx): State<NodeState>,
    Query(q): Query<StoreChunkQuery>,
    headers: HeaderMap,
    body: Body,
) -> Result<(StatusCode, Json<StoreChunkResponse>), ApiError> {
    // Fault injection checks
    ctx.fault_injector.record_store_attempt(q.chunk_index);
    ctx.fault_injector.apply_latency().await;
    if ctx.fault_injector.should_fail_store(q.chunk_index) {
        return Err(ApiError::Any(anyhow!("Fault injection: store failed")));
    }

    validate_id(&q.file_id)?;
    let replica_type = parse_replica_type(q.replica_type.as_deref())?;
    let expected = expected_checksum(&headers)?;

    let stored = write_chunk(
        &ctx.data_root,
        &ctx.node_id,
        &q.file_id,
        q.chunk_index,
        body.into_data_stream(),
        expected.as_deref(),
        ctx.max_chunk_size,
        ctx.durability,
    )
    .await?;

    let replica = ChunkReplica {
        file_id: q.file_id.clone(),
        chunk_index: q.chunk_index,
        node_id: ctx.node_id.clone(),
        replica_key: String::new(),
        storage_path: stored.path.to_string_lossy().into_owned(),
        checksum: stored.checksum.clone(),
        replica_type,
        created_at: utc_now_secs(),
        size: stored.size,
    };
    ctx.catalog.put_replica(&replica).await?;

    info!(size = stored.size, %replica_type, "chunk stored");

    let resp = StoreChunkResponse {
        file_id: q.file_id,
        chunk_index: q.chunk_index,
        node_id: ctx.node_id.clone(),
        checksum: stored.checksum,
        size: stored.size,
    };
    Ok((StatusCode::CREATED, Json(resp)))
}

// GET /get-chunk?file_id=&chunk_index=
#[tracing::instrument(name = "node.get_chunk", skip(ctx))]
pub async fn get_chunk(
    State(ctx): State<NodeState>,
    Query(q): Query<ChunkQuery>,
) -> Result<Response, ApiError> {
    ctx.fault_injector.apply_latency().await;
    if ctx.fault_injector.should_fail_get() {
        return Err(ApiError::Any(anyhow!("Fault injection: get failed")));
    }

    validate_id(&q.file_id)?;
    let (file, len) = open_chunk(&ctx.data_root, &ctx.node_id, &q.file_id, q.chunk_index).await?;

    let mut resp = Body::from_stream(ReaderStream::new(file)).into_response();
    resp.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/octet-stream"),
    );
    resp.headers_mut()
        .insert(header::CONTENT_LENGTH, HeaderValue::from(len));

    Ok(resp)
}

// DELETE /delete-chunk?file_id=&chunk_index=
/// Removes the bytes and the replica row of one chunk held by this node.
#[tracing::instrument(name = "node.delete_chunk", skip(ctx))]
pub async fn delete_chunk(
    State(ctx): State<NodeState>,
    Query(q): Query<ChunkQuery>,
) -> Result<StatusCode, ApiError> {
    validate_id(&q.file_id)?;

    let existed = remove_chunk(&ctx.data_root, &ctx.node_id, &q.file_id, q.chunk_index).await?;
    ctx.catalog
        .delete_replica(&q.file_id, q.chunk_index, &ctx.node_id)
        .await?;

    if !existed {
        return Err(ApiError::NotFound(format!(
            "chunk {}/{}",
            q.file_id, q.chunk_index
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

// GET /admin/chunks
#[tracing::instrument(name = "node.admin.chunks", skip(ctx))]
pub async fn admin_chunks(
    State(ctx): State<NodeState>,
) -> Result<Json<Vec<ChunkReplica>>, ApiError> {
    Ok(Json(ctx.catalog.replicas_on_node(&ctx.node_id).await?))
}
