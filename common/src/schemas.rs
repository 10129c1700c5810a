use serde::{Deserialize, Serialize};

use crate::model::NodeRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitUploadRequest {
    #[serde(default)]
    pub filename: String,
    pub size: i64,
    #[serde(default)]
    pub chunk_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UploadTarget {
    pub chunk_index: u64,
    pub node: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub secondaries: Vec<String>,
}

/// Response of `POST /init-upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadPlan {
    pub file_id: String,
    pub chunk_size: u64,
    pub upload_targets: Vec<UploadTarget>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub file_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DownloadTarget {
    pub chunk_index: u64,
    pub url: String,
    pub checksum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreChunkResponse {
    pub file_id: String,
    pub chunk_index: u64,
    pub node_id: String,
    pub checksum: String,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeView {
    #[serde(flatten)]
    pub record: NodeRecord,
    pub active: bool,
}
