use clap::ValueEnum;
use std::fmt::Display;
use std::time::Duration;

use common::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNKS_PER_FILE, DEFAULT_PROXY_TIMEOUT_SECS};

/// How the proxy stores the secondary copies of a chunk once the primary
/// accepted it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ReplicationStrategy {
    /// Await every secondary before answering the client.
    #[default]
    Sync,
    /// Answer as soon as the primary is stored; secondaries run in the background.
    Async,
}

impl Display for ReplicationStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplicationStrategy::Sync => write!(f, "sync"),
            ReplicationStrategy::Async => write!(f, "async"),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("replication factor must be at least 1")]
    ReplicationFactor,
    #[error("heartbeat timeout must be positive")]
    HeartbeatTimeout,
    #[error("proxy timeout must be positive")]
    ProxyTimeout,
    #[error("max chunk size must be positive")]
    MaxChunkSize,
    #[error("max chunks per file must be positive")]
    MaxChunksPerFile,
    #[error("node ttl ({ttl}s) must not be shorter than the heartbeat timeout ({timeout}s)")]
    NodeTtl { ttl: u64, timeout: i64 },
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub replication_factor: usize,
    pub replication_strategy: ReplicationStrategy,
    pub heartbeat_timeout_secs: i64,
    pub default_chunk_size: i64,
    pub proxy_timeout: Duration,
    pub max_chunk_size: u64,
    /// Upper bound on the chunk count of one upload plan.
    pub max_chunks_per_file: u64,
    /// Base URL advertised in plans; derived from the Host header when unset.
    pub public_url: Option<String>,
    /// Registry rows whose heartbeat is older than this are deleted. 0 disables pruning.
    pub node_ttl_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            replication_factor: 2,
            replication_strategy: ReplicationStrategy::Sync,
            heartbeat_timeout_secs: 60,
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            proxy_timeout: Duration::from_secs(DEFAULT_PROXY_TIMEOUT_SECS),
            max_chunk_size: 64 * 1024 * 1024,
            max_chunks_per_file: DEFAULT_MAX_CHUNKS_PER_FILE,
            public_url: None,
            node_ttl_secs: 0,
        }
    }
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.replication_factor < 1 {
            return Err(ConfigError::ReplicationFactor);
        }
        if self.heartbeat_timeout_secs <= 0 {
            return Err(ConfigError::HeartbeatTimeout);
        }
        if self.proxy_timeout.is_zero() {
            return Err(ConfigError::ProxyTimeout);
        }
        if self.max_chunk_size == 0 {
            return Err(ConfigError::MaxChunkSize);
        }
        if self.max_chunks_per_file == 0 {
            return Err(ConfigError::MaxChunksPerFile);
        }
        // a ttl shorter than the liveness window would prune active nodes
        let ttl_too_short = i64::try_from(self.node_ttl_secs)
            .map(|ttl| ttl < self.heartbeat_timeout_secs)
            .unwrap_or(false);
        if self.node_ttl_secs > 0 && ttl_too_short {
            return Err(ConfigError::NodeTtl {
                ttl: self.node_ttl_secs,
                timeout: self.heartbeat_timeout_secs,
            });
        }
        Ok(())
    }
}
