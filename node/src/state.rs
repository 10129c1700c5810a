use clap::ValueEnum;
use std::path::PathBuf;
use std::sync::Arc;

use common::catalog::ChunkCatalog;
use common::model::NodeRecord;
use common::registry::NodeRegistry;
use common::store::MetaStore;

use crate::fault_injection::FaultInjector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, ValueEnum)]
pub enum DurabilityLevel {
    /// fsync the chunk file and its directory before acknowledging
    #[default]
    Immediate,
    /// no explicit fsync; rely on the OS
    Os,
}

#[derive(Clone)]
pub struct NodeState {
    pub data_root: Arc<PathBuf>,
    pub node_id: String,
    /// Registration template: identity and address, re-sent whenever the
    /// registry has lost this node.
    pub record: NodeRecord,
    pub registry: NodeRegistry,
    pub catalog: ChunkCatalog,
    pub max_chunk_size: u64,
    pub durability: DurabilityLevel,
    pub fault_injector: Arc<FaultInjector>,
}

impl NodeState {
    pub fn new(
        data_root: PathBuf,
        record: NodeRecord,
        store: Arc<dyn MetaStore>,
        max_chunk_size: u64,
        durability: DurabilityLevel,
    ) -> Self {
        Self {
            data_root: Arc::new(data_root),
            node_id: record.node_id.clone(),
            record,
            registry: NodeRegistry::new(store.clone()),
            catalog: ChunkCatalog::new(store),
            max_chunk_size,
            durability,
            fault_injector: Arc::new(FaultInjector::new()),
        }
    }
}
