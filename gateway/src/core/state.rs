use reqwest::Client;
use std::sync::Arc;

use common::catalog::ChunkCatalog;
use common::registry::NodeRegistry;
use common::store::MetaStore;

use crate::core::config::GatewayConfig;

#[derive(Clone)]
pub struct GatewayState {
    pub http_client: Client,

    pub store: Arc<dyn MetaStore>,
    pub registry: NodeRegistry,
    pub catalog: ChunkCatalog,

    pub cfg: Arc<GatewayConfig>,
}

impl GatewayState {
    pub fn new(http_client: Client, store: Arc<dyn MetaStore>, cfg: GatewayConfig) -> Self {
        Self {
            http_client,
            registry: NodeRegistry::new(store.clone()),
            catalog: ChunkCatalog::new(store.clone()),
            store,
            cfg: Arc::new(cfg),
        }
    }
}
