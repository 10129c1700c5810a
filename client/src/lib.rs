pub mod api;
pub mod download;
pub mod error;
pub mod upload;

use common::retry::RetryConfig;

pub use crate::api::GatewayClient;
pub use crate::download::download_file;
pub use crate::error::ClientError;
pub use crate::upload::upload_file;

const DEFAULT_MAX_INFLIGHT: usize = 8;

/// Knobs shared by uploads and downloads.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Upper bound on chunk requests in flight at once.
    pub max_inflight: usize,
    /// Applied to every chunk request independently.
    pub retry: RetryConfig,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            max_inflight: DEFAULT_MAX_INFLIGHT,
            retry: RetryConfig::default(),
        }
    }
}
