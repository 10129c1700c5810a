#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use reqwest::Client;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use client::{GatewayClient, TransferOptions};
use common::kvdb::KvDb;
use common::model::NodeRecord;
use common::remote_store::RemoteStore;
use common::retry::RetryConfig;
use common::schemas::NodeView;
use gateway::core::config::{GatewayConfig, ReplicationStrategy};
use gateway::core::state::GatewayState;
use node::heartbeat::{heartbeat_loop, register_node};
use node::state::{DurabilityLevel, NodeState};

pub struct TestServer {
    pub handle: JoinHandle<Result<()>>,
    pub shutdown_tx: watch::Sender<bool>,
    pub addr: SocketAddr,
    pub url: String,
}

impl TestServer {
    async fn spawn(app: axum::Router) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Self::spawn_on(listener, app)
    }

    fn spawn_on(listener: TcpListener, app: axum::Router) -> Result<Self> {
        let addr = listener.local_addr()?;
        let url = format!("http://{}", addr);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.changed().await;
                })
                .await
                .map_err(anyhow::Error::from)
        });

        Ok(TestServer {
            handle,
            shutdown_tx,
            addr,
            url,
        })
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.handle.abort();
        let _ = self.handle.await;
        Ok(())
    }
}

pub struct TestGateway {
    pub server: TestServer,
    pub state: GatewayState,
    pub data_dir: TempDir,
}

impl TestGateway {
    pub async fn new(replication_factor: usize) -> Result<Self> {
        Self::with_config(replication_factor, ReplicationStrategy::Sync, 60).await
    }

    pub async fn with_config(
        replication_factor: usize,
        replication_strategy: ReplicationStrategy,
        heartbeat_timeout_secs: i64,
    ) -> Result<Self> {
        let data_dir = TempDir::new()?;
        let db = KvDb::open(&data_dir.path().join("index"))?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let url = format!("http://{}", listener.local_addr()?);

        let cfg = GatewayConfig {
            replication_factor,
            replication_strategy,
            heartbeat_timeout_secs,
            proxy_timeout: Duration::from_secs(10),
            public_url: Some(url),
            ..GatewayConfig::default()
        };
        cfg.validate()?;

        let http_client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        let state = GatewayState::new(http_client, Arc::new(db), cfg);

        let server = TestServer::spawn_on(listener, gateway::router(state.clone()))?;

        Ok(TestGateway {
            server,
            state,
            data_dir,
        })
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    pub fn client(&self) -> GatewayClient {
        GatewayClient::new(Client::new(), self.url())
    }

    pub async fn shutdown(self) -> Result<()> {
        self.server.shutdown().await
    }
}

pub struct TestNode {
    pub server: TestServer,
    pub state: NodeState,
    pub data_dir: TempDir,
    pub heartbeat: Option<(watch::Sender<bool>, JoinHandle<Result<()>>)>,
}

impl TestNode {
    /// Starts a node and registers it with the gateway.
    pub async fn new(gateway_url: &str, node_id: &str) -> Result<Self> {
        let data_dir = TempDir::new()?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let http_client = Client::builder().timeout(Duration::from_secs(10)).build()?;
        let store = Arc::new(RemoteStore::new(http_client, gateway_url));
        let state = NodeState::new(
            data_dir.path().to_path_buf(),
            NodeRecord::new(node_id, "127.0.0.1", port),
            store,
            64 * 1024 * 1024,
            DurabilityLevel::Os,
        );

        let server = TestServer::spawn_on(listener, node::router(state.clone(), true))?;
        register_node(&state).await?;

        Ok(TestNode {
            server,
            state,
            data_dir,
            heartbeat: None,
        })
    }

    pub fn url(&self) -> &str {
        &self.server.url
    }

    pub fn node_id(&self) -> &str {
        &self.state.node_id
    }

    pub fn start_heartbeat(&mut self, interval_ms: u64) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(heartbeat_loop(
            self.state.clone(),
            Duration::from_millis(interval_ms),
            rx,
        ));
        self.heartbeat = Some((tx, handle));
    }

    pub async fn stop_heartbeat(&mut self) {
        if let Some((tx, handle)) = self.heartbeat.take() {
            let _ = tx.send(true);
            let _ = handle.await;
        }
    }

    /// Path of a stored chunk on this node's disk.
    pub fn chunk_file(&self, file_id: &str, chunk_index: u64) -> PathBuf {
        common::file_utils::chunk_path(&self.state.data_root, &self.state.node_id, file_id, chunk_index)
    }

    pub async fn fail_store(&self, client: &Client, query: &str) -> Result<()> {
        let resp = client
            .post(format!("{}/admin/fail/store?{}", self.url(), query))
            .send()
            .await?;
        anyhow::ensure!(resp.status().is_success(), "fail_store: {}", resp.status());
        Ok(())
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.stop_heartbeat().await;
        self.server.shutdown().await
    }
}

pub async fn start_nodes(gateway_url: &str, count: usize) -> Result<Vec<TestNode>> {
    let mut nodes = Vec::new();
    for i in 0..count {
        nodes.push(TestNode::new(gateway_url, &format!("node-{}", i + 1)).await?);
    }
    Ok(nodes)
}

pub async fn shutdown_nodes(nodes: Vec<TestNode>) -> Result<()> {
    for node in nodes {
        node.shutdown().await?;
    }
    Ok(())
}

pub async fn list_nodes(client: &Client, gateway_url: &str) -> Result<Vec<NodeView>> {
    let resp = client
        .get(format!("{}/admin/nodes", gateway_url))
        .send()
        .await?;

    if !resp.status().is_success() {
        anyhow::bail!("list_nodes failed: {}", resp.status());
    }

    Ok(resp.json().await?)
}

pub async fn wait_until<F, Fut>(timeout_ms: u64, mut check_fn: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let timeout_duration = Duration::from_millis(timeout_ms);

    loop {
        if check_fn().await? {
            return Ok(());
        }

        if start.elapsed() > timeout_duration {
            anyhow::bail!("wait_until timed out after {}ms", timeout_ms);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// Retries quickly so failure tests stay fast.
pub fn fast_transfer() -> TransferOptions {
    TransferOptions {
        max_inflight: 4,
        retry: RetryConfig {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(10),
            backoff_base: Duration::from_millis(20),
            backoff_max: Duration::from_millis(100),
            jitter_frac: 0.0,
        },
    }
}

pub fn generate_bytes(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i * 31 % 251) as u8).collect()
}

/// Writes `data` to a fresh file inside `dir` and returns its path.
pub fn write_input(dir: &TempDir, name: &str, data: &[u8]) -> Result<PathBuf> {
    let path = dir.path().join(name);
    std::fs::write(&path, data)?;
    Ok(path)
}
