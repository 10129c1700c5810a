use reqwest::{Client, Response};

use common::schemas::{DownloadTarget, FinalizeRequest, InitUploadRequest, UploadPlan};

use crate::error::ClientError;

/// Control-plane calls to the gateway. Chunk bytes never go through here.
#[derive(Clone)]
pub struct GatewayClient {
    http: Client,
    base_url: String,
}

impl GatewayClient {
    pub fn new(http: Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    async fn check(resp: Response) -> Result<Response, ClientError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ClientError::Gateway { status, body })
    }

    pub async fn init_upload(&self, req: &InitUploadRequest) -> Result<UploadPlan, ClientError> {
        let resp = self
            .http
            .post(format!("{}/init-upload", self.base_url))
            .json(req)
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }

    pub async fn finalize(&self, file_id: &str) -> Result<String, ClientError> {
        let resp = self
            .http
            .post(format!("{}/finalize-upload", self.base_url))
            .json(&FinalizeRequest {
                file_id: file_id.to_string(),
            })
            .send()
            .await?;
        Ok(Self::check(resp).await?.text().await?)
    }

    pub async fn download_plan(&self, file_id: &str) -> Result<Vec<DownloadTarget>, ClientError> {
        let resp = self
            .http
            .get(format!("{}/download-plan", self.base_url))
            .query(&[("file_id", file_id)])
            .send()
            .await?;
        Ok(Self::check(resp).await?.json().await?)
    }
}
