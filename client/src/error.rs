use reqwest::StatusCode;
use std::io;

use common::retry::{RetryClass, classify_reqwest, classify_status};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("gateway replied {status}: {body}")]
    Gateway { status: StatusCode, body: String },
    #[error("chunk {chunk_index}: upstream replied {status}: {body}")]
    ChunkStatus {
        chunk_index: u64,
        status: StatusCode,
        body: String,
    },
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
    #[error("chunk {chunk_index} failed integrity check: expected {expected}, got {actual}")]
    Integrity {
        chunk_index: u64,
        expected: String,
        actual: String,
    },
    #[error("transfer failed for chunks {:?}", failed_indices(.failures))]
    Transfer { failures: Vec<(u64, ClientError)> },
    #[error("download plan has no chunk {0}")]
    MissingChunk(u64),
    #[error("invalid plan: {0}")]
    InvalidPlan(String),
    #[error("chunk task ended abnormally: {0}")]
    Task(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

fn failed_indices(failures: &[(u64, ClientError)]) -> Vec<u64> {
    failures.iter().map(|(i, _)| *i).collect()
}

impl ClientError {
    /// Transport errors, 5xx and 429 are worth another attempt. Anything else,
    /// integrity failures included, would fail the same way again.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            ClientError::Http(e) => classify_reqwest(e),
            ClientError::Gateway { status, .. } | ClientError::ChunkStatus { status, .. } => {
                classify_status(*status)
            }
            _ => RetryClass::NonRetryable,
        }
    }

    /// Indices of the failed chunks, sorted, for a `Transfer` error.
    pub fn failed_chunks(&self) -> Vec<u64> {
        match self {
            ClientError::Transfer { failures } => failed_indices(failures),
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_error_names_failed_chunks() {
        let err = ClientError::Transfer {
            failures: vec![
                (1, ClientError::MissingChunk(1)),
                (4, ClientError::Task("panicked".into())),
            ],
        };
        assert_eq!(err.to_string(), "transfer failed for chunks [1, 4]");
        assert_eq!(err.failed_chunks(), vec![1, 4]);
    }

    #[test]
    fn only_transient_failures_are_retried() {
        let server = ClientError::ChunkStatus {
            chunk_index: 0,
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: String::new(),
        };
        let rejected = ClientError::ChunkStatus {
            chunk_index: 0,
            status: StatusCode::BAD_REQUEST,
            body: "checksum mismatch".into(),
        };
        let integrity = ClientError::Integrity {
            chunk_index: 0,
            expected: "a".into(),
            actual: "b".into(),
        };

        assert_eq!(server.retry_class(), RetryClass::Retryable);
        assert_eq!(rejected.retry_class(), RetryClass::NonRetryable);
        assert_eq!(integrity.retry_class(), RetryClass::NonRetryable);
    }
}
