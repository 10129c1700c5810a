use std::collections::{BTreeMap, HashSet};

use common::error::ApiError;
use common::model::{ChunkReplica, ReplicaType};
use common::schemas::DownloadTarget;
use common::url_utils::with_query;

/// Active primary first, then any active replica, then the first replica
/// of the group even if its node is not known to be active.
pub fn select_best_replica<'a>(
    replicas: &'a [ChunkReplica],
    active_nodes: &HashSet<String>,
) -> Option<&'a ChunkReplica> {
    let is_active = |r: &&ChunkReplica| active_nodes.contains(&r.node_id);

    replicas
        .iter()
        .filter(is_active)
        .find(|r| r.replica_type == ReplicaType::Primary)
        .or_else(|| replicas.iter().find(is_active))
        .or_else(|| replicas.first())
}

/// Builds one download target per stored chunk, ordered by chunk index.
pub fn plan_download(
    file_id: &str,
    replicas: Vec<ChunkReplica>,
    active_nodes: &HashSet<String>,
    gateway_url: &str,
) -> Result<Vec<DownloadTarget>, ApiError> {
    if replicas.is_empty() {
        return Err(ApiError::NotFound(format!("file {file_id}")));
    }

    let mut by_chunk: BTreeMap<u64, Vec<ChunkReplica>> = BTreeMap::new();
    for r in replicas {
        by_chunk.entry(r.chunk_index).or_default().push(r);
    }

    let mut targets = Vec::with_capacity(by_chunk.len());
    for (chunk_index, group) in &by_chunk {
        let Some(best) = select_best_replica(group, active_nodes) else {
            continue;
        };
        let index = chunk_index.to_string();
        let url = with_query(
            gateway_url,
            "/proxy-chunk-download",
            &[
                ("file_id", file_id),
                ("chunk_index", index.as_str()),
                ("node_id", best.node_id.as_str()),
            ],
        )?;
        targets.push(DownloadTarget {
            chunk_index: *chunk_index,
            url,
            checksum: best.checksum.clone(),
        });
    }

    if targets.is_empty() {
        return Err(ApiError::NotFound(format!("no readable replica for file {file_id}")));
    }

    Ok(targets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(chunk_index: u64, node_id: &str, replica_type: ReplicaType) -> ChunkReplica {
        ChunkReplica {
            file_id: "f".into(),
            chunk_index,
            node_id: node_id.into(),
            replica_key: common::model::replica_key(chunk_index, node_id),
            storage_path: String::new(),
            checksum: format!("sum-{chunk_index}-{node_id}"),
            replica_type,
            created_at: 0,
            size: 0,
        }
    }

    fn active(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn prefers_active_primary() {
        let group = vec![
            replica(0, "a", ReplicaType::Secondary),
            replica(0, "b", ReplicaType::Primary),
        ];
        let best = select_best_replica(&group, &active(&["a", "b"])).unwrap();
        assert_eq!(best.node_id, "b");
    }

    #[test]
    fn falls_back_to_active_secondary_when_primary_is_down() {
        let group = vec![
            replica(0, "a", ReplicaType::Primary),
            replica(0, "b", ReplicaType::Secondary),
        ];
        let best = select_best_replica(&group, &active(&["b"])).unwrap();
        assert_eq!(best.node_id, "b");
    }

    #[test]
    fn falls_back_to_first_replica_when_nothing_is_active() {
        let group = vec![
            replica(0, "a", ReplicaType::Secondary),
            replica(0, "b", ReplicaType::Primary),
        ];
        let best = select_best_replica(&group, &active(&[])).unwrap();
        assert_eq!(best.node_id, "a");
        assert!(select_best_replica(&[], &active(&["a"])).is_none());
    }

    #[test]
    fn targets_are_ordered_numerically() {
        // catalog order is lexicographic on "{index}#{node}", so 10 sorts before 2
        let rows = vec![
            replica(10, "a", ReplicaType::Primary),
            replica(2, "a", ReplicaType::Primary),
            replica(0, "b", ReplicaType::Primary),
            replica(1, "a", ReplicaType::Primary),
        ];
        let plan = plan_download("f", rows, &active(&["a", "b"]), "http://gw").unwrap();

        let indices: Vec<u64> = plan.iter().map(|t| t.chunk_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 10]);
        assert_eq!(plan[0].checksum, "sum-0-b");
        assert_eq!(
            plan[0].url,
            "http://gw/proxy-chunk-download?file_id=f&chunk_index=0&node_id=b"
        );
    }

    #[test]
    fn unknown_file_is_not_found() {
        let res = plan_download("missing", vec![], &active(&["a"]), "http://gw");
        assert!(matches!(res, Err(ApiError::NotFound(_))));
    }
}
