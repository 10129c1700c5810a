use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;
use tracing::info;

use common::file_utils::init_dirs;
use common::key_utils::validate_id;
use common::model::NodeRecord;
use common::remote_store::RemoteStore;
use common::telemetry::init_telemetry;
use common::url_utils::{parse_socket_addr, sanitize_url};

use node::heartbeat::{heartbeat_loop, register_node};
use node::identity::{DEFAULT_METADATA_URL, resolve_identity};
use node::router;
use node::state::{DurabilityLevel, NodeState};

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Data root; chunks live under {data}/{node_id}/chunks
    #[arg(long, default_value = ".")]
    data: PathBuf,

    /// Gateway base URL (hosts the node registry and chunk catalog)
    #[arg(long, env = "GATEWAY_URL")]
    gateway_url: String,

    /// Node id; looked up from instance metadata when unset
    #[arg(long, env = "NODE_ID")]
    node_id: Option<String>,

    /// Address the gateway uses to reach this node
    #[arg(long, env = "NODE_PRIVATE_IP")]
    private_address: Option<String>,

    #[arg(long, env = "NODE_PORT", default_value_t = 8080)]
    port: u16,

    /// Listen address (defaults to 0.0.0.0:{port})
    #[arg(long)]
    listen: Option<String>,

    #[arg(long, env = "NODE_HEARTBEAT_INTERVAL", default_value_t = 30)]
    heartbeat_interval_secs: u64,

    #[arg(long, default_value = DEFAULT_METADATA_URL)]
    metadata_url: String,

    /// Max accepted chunk size in bytes
    #[arg(long, default_value_t = 64 * 1024 * 1024u64)]
    max_chunk_size: u64,

    #[arg(long, value_enum, default_value_t = DurabilityLevel::Immediate)]
    durability: DurabilityLevel,

    #[arg(long, default_value_t = 10)]
    http_timeout_secs: u64,

    /// Mount the /admin/fail/* endpoints
    #[arg(long, default_value_t = false)]
    enable_fault_injection: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("node");

    let args = Args::parse();

    let http_client = reqwest::Client::builder()
        .pool_idle_timeout(Duration::from_secs(30))
        .tcp_keepalive(Duration::from_secs(30))
        .timeout(Duration::from_secs(args.http_timeout_secs))
        .build()?;

    let identity = resolve_identity(
        &http_client,
        &args.metadata_url,
        args.node_id.clone(),
        args.private_address.clone(),
    )
    .await;
    validate_id(&identity.node_id)?;

    init_dirs(&args.data, &identity.node_id).await?;

    let gateway_url = sanitize_url(&args.gateway_url)?;
    let store = Arc::new(RemoteStore::new(http_client, &gateway_url));

    let mut record = NodeRecord::new(identity.node_id, identity.private_address, args.port);
    record.instance_id = identity.instance_id;

    let state = NodeState::new(
        args.data.clone(),
        record,
        store,
        args.max_chunk_size,
        args.durability,
    );

    register_node(&state).await?;

    // Spawn heartbeat loop with shutdown signal
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel::<bool>(false);
    let hb_handle = tokio::spawn(heartbeat_loop(
        state.clone(),
        Duration::from_secs(args.heartbeat_interval_secs.max(1)),
        shutdown_rx,
    ));

    let app = router(state, args.enable_fault_injection);

    let listen = args
        .listen
        .unwrap_or_else(|| format!("0.0.0.0:{}", args.port));
    let listener = TcpListener::bind(parse_socket_addr(&listen)?).await?;

    info!("listening on {}", listen);

    // Graceful shutdown: ctrl+c
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Stop heartbeat
    let _ = shutdown_tx.send(true);
    let _ = hb_handle.await;

    Ok(())
}
