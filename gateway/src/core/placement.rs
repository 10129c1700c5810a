use rand::Rng;
use rand::seq::SliceRandom;
use uuid::Uuid;

use common::error::ApiError;
use common::model::NodeRecord;
use common::schemas::{InitUploadRequest, UploadPlan, UploadTarget};
use common::url_utils::with_query;

/// Picks `replication_factor` distinct nodes for one chunk, primary first.
/// Each call draws a fresh uniform permutation of the active set.
pub fn choose_replica_set<'a, R: Rng + ?Sized>(
    active: &'a [NodeRecord],
    replication_factor: usize,
    rng: &mut R,
) -> Vec<&'a NodeRecord> {
    let mut order: Vec<&NodeRecord> = active.iter().collect();
    order.shuffle(rng);
    order.truncate(replication_factor);
    order
}

pub fn total_chunks(size: u64, chunk_size: u64) -> u64 {
    size.div_ceil(chunk_size)
}

/// Splits a file into chunks and assigns every chunk a primary and
/// `replication_factor - 1` secondaries drawn from the active nodes.
///
/// All upload URLs point at the gateway proxy, never at a node directly.
pub fn plan_upload<R: Rng + ?Sized>(
    active: &[NodeRecord],
    req: &InitUploadRequest,
    replication_factor: usize,
    default_chunk_size: i64,
    max_chunks: u64,
    gateway_url: &str,
    rng: &mut R,
) -> Result<UploadPlan, ApiError> {
    if req.filename.trim().is_empty() {
        return Err(ApiError::InvalidRequest("filename is required".into()));
    }
    if req.size <= 0 {
        return Err(ApiError::InvalidRequest(format!(
            "size must be positive, got {}",
            req.size
        )));
    }
    if active.len() < replication_factor {
        return Err(ApiError::NotEnoughNodes {
            required: replication_factor,
            available: active.len(),
        });
    }

    let chunk_size = match req.chunk_size {
        Some(c) if c > 0 => c as u64,
        _ => default_chunk_size.max(1) as u64,
    };
    let n_chunks = total_chunks(req.size as u64, chunk_size);
    if n_chunks > max_chunks {
        return Err(ApiError::InvalidRequest(format!(
            "{n_chunks} chunks exceed the limit of {max_chunks} per file; use a larger chunk size"
        )));
    }
    let capacity = usize::try_from(n_chunks)
        .map_err(|_| ApiError::InvalidRequest(format!("{n_chunks} chunks do not fit in memory")))?;
    let file_id = Uuid::new_v4().to_string();

    let mut upload_targets = Vec::with_capacity(capacity);
    for chunk_index in 0..n_chunks {
        let replicas = choose_replica_set(active, replication_factor, rng);
        let (primary, secondaries) = match replicas.split_first() {
            Some(split) => split,
            None => {
                return Err(ApiError::NotEnoughNodes {
                    required: replication_factor.max(1),
                    available: active.len(),
                });
            }
        };

        let secondaries: Vec<String> = secondaries.iter().map(|n| n.node_id.clone()).collect();
        let index = chunk_index.to_string();
        let joined = secondaries.join(",");
        let mut pairs = vec![
            ("file_id", file_id.as_str()),
            ("chunk_index", index.as_str()),
            ("node_id", primary.node_id.as_str()),
        ];
        if !secondaries.is_empty() {
            pairs.push(("secondaries", joined.as_str()));
        }

        upload_targets.push(UploadTarget {
            chunk_index,
            node: primary.node_id.clone(),
            url: with_query(gateway_url, "/proxy-chunk-upload", &pairs)?,
            secondaries,
        });
    }

    Ok(UploadPlan {
        file_id,
        chunk_size,
        upload_targets,
    })
}
