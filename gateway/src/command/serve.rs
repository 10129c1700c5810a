use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use common::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_MAX_CHUNKS_PER_FILE, DEFAULT_PROXY_TIMEOUT_SECS};
use common::kvdb::KvDb;
use common::url_utils::{parse_socket_addr, sanitize_url};

use crate::core::config::{GatewayConfig, ReplicationStrategy};
use crate::core::routes::router;
use crate::core::state::GatewayState;
use crate::core::sweeper::node_ttl_sweeper;

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// RocksDB directory holding the node registry and the chunk catalog
    #[arg(long, default_value = "./data/index")]
    index: PathBuf,

    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Base URL put in upload/download plans (defaults to http://{Host header})
    #[arg(long)]
    public_url: Option<String>,

    /// Number of nodes each chunk is stored on
    #[arg(long, env = "REPLICATION_FACTOR", default_value_t = 2)]
    replication_factor: usize,

    /// How secondary replicas are written
    #[arg(long, env = "REPLICATION_STRATEGY", value_enum, default_value_t = ReplicationStrategy::Sync)]
    replication_strategy: ReplicationStrategy,

    /// Seconds without heartbeat after which a node is no longer active
    #[arg(long, env = "NODE_HEARTBEAT_TIMEOUT", default_value_t = 60)]
    heartbeat_timeout_secs: i64,

    /// Chunk size used when the client does not ask for one (bytes)
    #[arg(long, env = "DEFAULT_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    default_chunk_size: i64,

    /// Timeout of each proxied node call (seconds)
    #[arg(long, default_value_t = DEFAULT_PROXY_TIMEOUT_SECS)]
    proxy_timeout_secs: u64,

    /// Largest chunk body accepted by the proxy (bytes)
    #[arg(long, default_value_t = 64 * 1024 * 1024u64)]
    max_chunk_size: u64,

    /// Largest number of chunks a single upload may be split into
    #[arg(long, default_value_t = DEFAULT_MAX_CHUNKS_PER_FILE)]
    max_chunks_per_file: u64,

    /// Delete registry rows silent for this long (seconds, 0 = never)
    #[arg(long, default_value_t = 0)]
    node_ttl_secs: u64,

    /// Registry TTL sweep interval (seconds)
    #[arg(long, default_value_t = 30)]
    node_sweep_secs: u64,
}

impl ServeArgs {
    fn gateway_config(&self) -> anyhow::Result<GatewayConfig> {
        let public_url = match &self.public_url {
            Some(url) => Some(sanitize_url(url)?),
            None => None,
        };

        let cfg = GatewayConfig {
            replication_factor: self.replication_factor,
            replication_strategy: self.replication_strategy,
            heartbeat_timeout_secs: self.heartbeat_timeout_secs,
            default_chunk_size: self.default_chunk_size,
            proxy_timeout: Duration::from_secs(self.proxy_timeout_secs),
            max_chunk_size: self.max_chunk_size,
            max_chunks_per_file: self.max_chunks_per_file,
            public_url,
            node_ttl_secs: self.node_ttl_secs,
        };
        cfg.validate()?;

        Ok(cfg)
    }
}

pub async fn serve(serve_args: ServeArgs) -> anyhow::Result<()> {
    let cfg = serve_args.gateway_config()?;
    let db = KvDb::open(&serve_args.index)?;

    let http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .build()?;

    let state = GatewayState::new(http_client, Arc::new(db), cfg);

    // Spawn registry TTL sweeper
    let (shutdown_tx, shutdown_rx) = watch::channel::<bool>(false);
    let sweeper_handle = (serve_args.node_ttl_secs > 0).then(|| {
        tokio::spawn(node_ttl_sweeper(
            state.registry.clone(),
            Duration::from_secs(serve_args.node_ttl_secs),
            Duration::from_secs(serve_args.node_sweep_secs.max(1)),
            shutdown_rx,
        ))
    });

    let app = router(state.clone());

    let socket_addr = parse_socket_addr(&serve_args.listen)?;
    let listener = TcpListener::bind(socket_addr).await?;

    info!(
        replication_factor = state.cfg.replication_factor,
        strategy = %state.cfg.replication_strategy,
        heartbeat_timeout_secs = state.cfg.heartbeat_timeout_secs,
        "listening on {}",
        serve_args.listen
    );

    // Graceful shutdown: ctrl+c
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Stop sweeper
    let _ = shutdown_tx.send(true);
    if let Some(handle) = sweeper_handle {
        let _ = handle.await;
    }

    Ok(())
}
