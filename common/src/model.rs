use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Active,
}

/// Identity and liveness of one storage node, as persisted in the registry.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeRecord {
    pub node_id: String,
    pub private_address: String,
    pub port: u16,
    pub heartbeat_timestamp: i64, // unix seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<NodeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub available_space: Option<u64>,
}

impl NodeRecord {
    pub fn new(node_id: impl Into<String>, private_address: impl Into<String>, port: u16) -> Self {
        Self {
            node_id: node_id.into(),
            private_address: private_address.into(),
            port,
            heartbeat_timestamp: 0,
            status: None,
            instance_id: None,
            available_space: None,
        }
    }

    /// Liveness is derived at read time; a record is never marked dead.
    pub fn is_active(&self, now: i64, heartbeat_timeout: i64) -> bool {
        self.status == Some(NodeStatus::Active) && now - self.heartbeat_timestamp <= heartbeat_timeout
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.private_address, self.port)
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplicaType {
    #[default]
    Primary,
    Secondary,
}

impl Display for ReplicaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicaType::Primary => write!(f, "primary"),
            ReplicaType::Secondary => write!(f, "secondary"),
        }
    }
}

impl FromStr for ReplicaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "primary" => Ok(ReplicaType::Primary),
            "secondary" => Ok(ReplicaType::Secondary),
            other => Err(format!("unknown replica type: {other}")),
        }
    }
}

/// One physical copy of one chunk.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkReplica {
    pub file_id: String,
    pub chunk_index: u64,
    pub node_id: String,
    pub replica_key: String, // "{chunk_index}#{node_id}"
    pub storage_path: String,
    pub checksum: String, // hex sha256
    pub replica_type: ReplicaType,
    pub created_at: i64, // unix seconds
    #[serde(default)]
    pub size: u64,
}

pub fn replica_key(chunk_index: u64, node_id: &str) -> String {
    format!("{}#{}", chunk_index, node_id)
}
