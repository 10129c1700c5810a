use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures_util::future::join_all;
use serde::Deserialize;
use tracing::{Instrument, info, warn};

use common::constants::{CHECKSUM_HEADER, REPLICAS_HEADER};
use common::error::ApiError;
use common::key_utils::{split_node_list, validate_id};
use common::model::{NodeRecord, ReplicaType};
use common::trace_middleware::inject_trace_context_reqwest;
use common::url_utils::with_query;

use crate::core::config::ReplicationStrategy;
use crate::core::state::GatewayState;

const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Deserialize)]
pub struct ProxyChunkQuery {
    pub file_id: String,
    pub chunk_index: u64,
    pub node_id: String,
    #[serde(default)]
    pub secondaries: Option<String>,
}

impl ProxyChunkQuery {
    fn validate(&self) -> Result<(), ApiError> {
        validate_id(&self.file_id)?;
        validate_id(&self.node_id)?;
        Ok(())
    }
}

// PUT /proxy-chunk-upload
/// Forwards one chunk to its primary node and mirrors the node's answer.
/// Secondaries named in the query are written after the primary succeeded.
#[tracing::instrument(
    name = "gateway.proxy_upload",
    skip(ctx, headers, body),
    fields(file_id = %q.file_id, chunk_index = q.chunk_index, node_id = %q.node_id, size = body.len())
)]
pub async fn proxy_upload(
    State(ctx): State<GatewayState>,
    Query(q): Query<ProxyChunkQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    q.validate()?;
    let checksum = forwarded_checksum(&headers)?;

    let primary = ctx.registry.get(&q.node_id).await?;
    let resp = store_on_node(
        &ctx,
        &primary,
        &q.file_id,
        q.chunk_index,
        ReplicaType::Primary,
        checksum.as_deref(),
        body.clone(),
    )
    .await?;

    let secondaries: Vec<String> = split_node_list(q.secondaries.as_deref())
        .into_iter()
        .filter(|id| id != &q.node_id)
        .collect();

    if !resp.status().is_success() || secondaries.is_empty() {
        return Ok(mirror_response(resp));
    }

    let requested = secondaries.len() + 1;
    match ctx.cfg.replication_strategy {
        ReplicationStrategy::Sync => {
            let stored = replicate_to_secondaries(
                ctx.clone(),
                q.file_id.clone(),
                q.chunk_index,
                secondaries,
                checksum,
                body,
            )
            .await;

            let mut out = mirror_response(resp);
            if let Ok(v) = HeaderValue::from_str(&format!("{}/{}", stored + 1, requested)) {
                out.headers_mut().insert(REPLICAS_HEADER, v);
            }
            Ok(out)
        }
        ReplicationStrategy::Async => {
            tokio::spawn(
                replicate_to_secondaries(
                    ctx.clone(),
                    q.file_id.clone(),
                    q.chunk_index,
                    secondaries,
                    checksum,
                    body,
                )
                .in_current_span(),
            );
            Ok(mirror_response(resp))
        }
    }
}

// GET /proxy-chunk-download
/// Streams a chunk from the named node without buffering it.
#[tracing::instrument(
    name = "gateway.proxy_download",
    skip(ctx),
    fields(file_id = %q.file_id, chunk_index = q.chunk_index, node_id = %q.node_id)
)]
pub async fn proxy_download(
    State(ctx): State<GatewayState>,
    Query(q): Query<ProxyChunkQuery>,
) -> Result<Response, ApiError> {
    q.validate()?;
    let node = ctx.registry.get(&q.node_id).await?;

    let index = q.chunk_index.to_string();
    let url = with_query(
        &node.base_url(),
        "/get-chunk",
        &[("file_id", q.file_id.as_str()), ("chunk_index", index.as_str())],
    )?;

    let req = ctx.http_client.get(url).timeout(ctx.cfg.proxy_timeout);
    let resp = inject_trace_context_reqwest(req)
        .send()
        .await
        .map_err(ApiError::UpstreamReq)?;

    Ok(mirror_response(resp))
}

async fn store_on_node(
    ctx: &GatewayState,
    node: &NodeRecord,
    file_id: &str,
    chunk_index: u64,
    replica_type: ReplicaType,
    checksum: Option<&str>,
    body: Bytes,
) -> Result<reqwest::Response, ApiError> {
    let index = chunk_index.to_string();
    let kind = replica_type.to_string();
    let url = with_query(
        &node.base_url(),
        "/store-chunk",
        &[
            ("file_id", file_id),
            ("chunk_index", index.as_str()),
            ("replica_type", kind.as_str()),
        ],
    )?;

    let mut req = ctx
        .http_client
        .put(url)
        .timeout(ctx.cfg.proxy_timeout)
        .body(body);
    if let Some(sum) = checksum {
        req = req.header(CHECKSUM_HEADER, sum);
    }

    inject_trace_context_reqwest(req)
        .send()
        .await
        .map_err(ApiError::UpstreamReq)
}

/// Stores the chunk on every secondary concurrently. Failures are logged and
/// counted, never propagated. Returns how many secondaries accepted the chunk.
async fn replicate_to_secondaries(
    ctx: GatewayState,
    file_id: String,
    chunk_index: u64,
    secondaries: Vec<String>,
    checksum: Option<String>,
    body: Bytes,
) -> usize {
    let futs = secondaries.iter().map(|node_id| {
        store_secondary(
            &ctx,
            node_id,
            &file_id,
            chunk_index,
            checksum.as_deref(),
            body.clone(),
        )
    });

    let mut stored = 0;
    for (node_id, res) in secondaries.iter().zip(join_all(futs).await) {
        match res {
            Ok(()) => stored += 1,
            Err(e) => warn!(%node_id, %file_id, chunk_index, "secondary replication failed: {e}"),
        }
    }
    info!(%file_id, chunk_index, stored, requested = secondaries.len(), "secondary replication done");

    stored
}

async fn store_secondary(
    ctx: &GatewayState,
    node_id: &str,
    file_id: &str,
    chunk_index: u64,
    checksum: Option<&str>,
    body: Bytes,
) -> Result<(), ApiError> {
    let node = ctx.registry.get(node_id).await?;
    let resp = store_on_node(
        ctx,
        &node,
        file_id,
        chunk_index,
        ReplicaType::Secondary,
        checksum,
        body,
    )
    .await?;

    if resp.status().is_success() {
        Ok(())
    } else {
        Err(ApiError::UpstreamStatus(resp.status()))
    }
}

/// The client's checksum header, if any. A header that cannot be forwarded
/// verbatim is rejected rather than dropped.
fn forwarded_checksum(headers: &HeaderMap) -> Result<Option<String>, ApiError> {
    match headers.get(CHECKSUM_HEADER) {
        None => Ok(None),
        Some(v) => v
            .to_str()
            .map(|s| Some(s.to_string()))
            .map_err(|_| ApiError::InvalidRequest(format!("{CHECKSUM_HEADER} is not ascii"))),
    }
}

fn mirror_response(resp: reqwest::Response) -> Response {
    let status = resp.status();
    let mut headers = resp.headers().clone();
    for name in HOP_BY_HOP {
        headers.remove(name);
    }

    let mut out = Body::from_stream(resp.bytes_stream()).into_response();
    *out.status_mut() = status;
    *out.headers_mut() = headers;
    out
}
