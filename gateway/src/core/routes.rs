use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, Query, State},
    http::{HeaderMap, StatusCode, header},
    middleware,
    routing::{get, post, put},
};
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use tracing::{info, warn};

use common::error::ApiError;
use common::key_utils::validate_id;
use common::schemas::{DownloadTarget, FinalizeRequest, InitUploadRequest, NodeView, UploadPlan};
use common::time_utils::utc_now_secs;
use common::trace_middleware::trace_context_middleware;

use crate::core::download::plan_download;
use crate::core::meta_routes::meta_router;
use crate::core::placement::plan_upload;
use crate::core::proxy::{proxy_download, proxy_upload};
use crate::core::state::GatewayState;

/// Every gateway route, shared by `gateway serve` and the test harness.
pub fn router(state: GatewayState) -> Router {
    let max_chunk = usize::try_from(state.cfg.max_chunk_size).unwrap_or(usize::MAX);

    Router::new()
        .route("/init-upload", post(init_upload))
        .route("/finalize-upload", post(finalize_upload))
        .route("/download-plan", get(download_plan))
        .route(
            "/proxy-chunk-upload",
            put(proxy_upload).layer(DefaultBodyLimit::max(max_chunk)),
        )
        .route("/proxy-chunk-download", get(proxy_download))
        .route("/admin/nodes", get(list_nodes))
        .merge(meta_router())
        .layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}

/// The base URL clients should use to reach this gateway.
fn gateway_base_url(ctx: &GatewayState, headers: &HeaderMap) -> Result<String, ApiError> {
    if let Some(url) = &ctx.cfg.public_url {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .filter(|h| !h.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("missing Host header".into()))?;
    Ok(format!("http://{host}"))
}

// POST /init-upload
#[tracing::instrument(name = "gateway.init_upload", skip(ctx, headers), fields(filename = %req.filename, size = req.size))]
pub async fn init_upload(
    State(ctx): State<GatewayState>,
    headers: HeaderMap,
    Json(req): Json<InitUploadRequest>,
) -> Result<Json<UploadPlan>, ApiError> {
    let active = ctx
        .registry
        .list_active(ctx.cfg.heartbeat_timeout_secs)
        .await?;
    let base_url = gateway_base_url(&ctx, &headers)?;

    let plan = plan_upload(
        &active,
        &req,
        ctx.cfg.replication_factor,
        ctx.cfg.default_chunk_size,
        ctx.cfg.max_chunks_per_file,
        &base_url,
        &mut rand::rng(),
    )?;

    info!(
        file_id = %plan.file_id,
        chunks = plan.upload_targets.len(),
        chunk_size = plan.chunk_size,
        "upload planned"
    );

    Ok(Json(plan))
}

// POST /finalize-upload
#[tracing::instrument(name = "gateway.finalize_upload", skip(ctx), fields(file_id = %req.file_id))]
pub async fn finalize_upload(
    State(ctx): State<GatewayState>,
    Json(req): Json<FinalizeRequest>,
) -> Result<(StatusCode, String), ApiError> {
    validate_id(&req.file_id)?;

    let stored: BTreeSet<u64> = ctx
        .catalog
        .replicas_for_file(&req.file_id)
        .await?
        .into_iter()
        .map(|r| r.chunk_index)
        .collect();
    let gaps = catalog_gaps(&stored);
    if gaps.is_empty() {
        info!(file_id = %req.file_id, chunks = stored.len(), "upload finalized");
    } else {
        warn!(file_id = %req.file_id, chunks = stored.len(), missing = ?gaps, "upload finalized with missing chunks");
    }

    Ok((StatusCode::OK, "File upload finalized successfully!\n".to_string()))
}

/// Chunk indices below the highest catalogued one that have no replica.
/// Trailing chunks that never arrived are invisible here.
fn catalog_gaps(stored: &BTreeSet<u64>) -> Vec<u64> {
    match stored.last() {
        Some(&last) => (0..last).filter(|i| !stored.contains(i)).collect(),
        None => Vec::new(),
    }
}

#[derive(Debug, Deserialize)]
pub struct DownloadPlanQuery {
    pub file_id: String,
}

// GET /download-plan?file_id=
#[tracing::instrument(name = "gateway.download_plan", skip(ctx, headers), fields(file_id = %q.file_id))]
pub async fn download_plan(
    State(ctx): State<GatewayState>,
    headers: HeaderMap,
    Query(q): Query<DownloadPlanQuery>,
) -> Result<Json<Vec<DownloadTarget>>, ApiError> {
    validate_id(&q.file_id)?;

    let replicas = ctx.catalog.replicas_for_file(&q.file_id).await?;
    let active: HashSet<String> = ctx
        .registry
        .list_active(ctx.cfg.heartbeat_timeout_secs)
        .await?
        .into_iter()
        .map(|n| n.node_id)
        .collect();
    let base_url = gateway_base_url(&ctx, &headers)?;

    let plan = plan_download(&q.file_id, replicas, &active, &base_url)?;

    Ok(Json(plan))
}

// GET /admin/nodes
#[tracing::instrument(name = "gateway.admin.list_nodes", skip(ctx))]
pub async fn list_nodes(State(ctx): State<GatewayState>) -> Result<Json<Vec<NodeView>>, ApiError> {
    let now = utc_now_secs();
    let mut nodes: Vec<NodeView> = ctx
        .registry
        .list_all()
        .await?
        .into_iter()
        .map(|record| NodeView {
            active: record.is_active(now, ctx.cfg.heartbeat_timeout_secs),
            record,
        })
        .collect();
    nodes.sort_by(|a, b| a.record.node_id.cmp(&b.record.node_id));

    Ok(Json(nodes))
}
