use reqwest::Client;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_METADATA_URL: &str = "http://169.254.169.254";
const METADATA_TIMEOUT: Duration = Duration::from_secs(2);

const FALLBACK_NODE_ID: &str = "node-local";
const FALLBACK_ADDRESS: &str = "127.0.0.1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub node_id: String,
    pub private_address: String,
    pub instance_id: Option<String>,
}

async fn metadata(client: &Client, base_url: &str, item: &str) -> Option<String> {
    let url = format!("{}/latest/meta-data/{}", base_url.trim_end_matches('/'), item);
    let resp = client
        .get(url)
        .timeout(METADATA_TIMEOUT)
        .send()
        .await
        .ok()?;
    if !resp.status().is_success() {
        return None;
    }
    let text = resp.text().await.ok()?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Works out who this node is. Explicit values win; anything missing is
/// looked up from the instance metadata service, and a failed lookup falls
/// back to a local identity.
pub async fn resolve_identity(
    client: &Client,
    metadata_url: &str,
    node_id: Option<String>,
    private_address: Option<String>,
) -> Identity {
    if let (Some(node_id), Some(private_address)) = (&node_id, &private_address) {
        return Identity {
            node_id: node_id.clone(),
            private_address: private_address.clone(),
            instance_id: None,
        };
    }

    let instance_id = metadata(client, metadata_url, "instance-id").await;
    let local_ip = match &private_address {
        Some(_) => None,
        None => metadata(client, metadata_url, "local-ipv4").await,
    };

    if instance_id.is_none() && node_id.is_none() {
        warn!("instance metadata unavailable, using {FALLBACK_NODE_ID}");
    }

    let identity = Identity {
        node_id: node_id
            .or_else(|| instance_id.clone())
            .unwrap_or_else(|| FALLBACK_NODE_ID.to_string()),
        private_address: private_address
            .or(local_ip)
            .unwrap_or_else(|| FALLBACK_ADDRESS.to_string()),
        instance_id,
    };
    info!(node_id = %identity.node_id, address = %identity.private_address, "resolved node identity");

    identity
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, routing::get};
    use tokio::net::TcpListener;

    async fn fake_metadata_service() -> String {
        let app = Router::new()
            .route("/latest/meta-data/instance-id", get(|| async { "i-0abc123\n" }))
            .route("/latest/meta-data/local-ipv4", get(|| async { "10.1.2.3" }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn explicit_identity_skips_lookup() {
        let id = resolve_identity(
            &Client::new(),
            "http://127.0.0.1:1",
            Some("n1".into()),
            Some("10.0.0.9".into()),
        )
        .await;
        assert_eq!(id.node_id, "n1");
        assert_eq!(id.private_address, "10.0.0.9");
        assert_eq!(id.instance_id, None);
    }

    #[tokio::test]
    async fn identity_from_metadata_service() {
        let url = fake_metadata_service().await;
        let id = resolve_identity(&Client::new(), &url, None, None).await;
        assert_eq!(id.node_id, "i-0abc123");
        assert_eq!(id.private_address, "10.1.2.3");
        assert_eq!(id.instance_id.as_deref(), Some("i-0abc123"));
    }

    #[tokio::test]
    async fn unreachable_metadata_falls_back() {
        let id = resolve_identity(&Client::new(), "http://127.0.0.1:1", None, None).await;
        assert_eq!(id.node_id, FALLBACK_NODE_ID);
        assert_eq!(id.private_address, FALLBACK_ADDRESS);
    }
}
