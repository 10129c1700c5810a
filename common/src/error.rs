use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::io;

#[derive(thiserror::Error, Debug)]
pub enum KeyError {
    #[error("identifier is empty or too long")]
    Length,
    #[error("identifier contains forbidden characters")]
    Forbidden,
}

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unknown table: {0}")]
    UnknownTable(String),
    #[error("backend: {0}")]
    Backend(#[from] rocksdb::Error),
    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("remote store request failed: {0}")]
    Remote(#[from] reqwest::Error),
    #[error("remote store replied {0}")]
    RemoteStatus(reqwest::StatusCode),
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("not enough active nodes: required {required}, available {available}")]
    NotEnoughNodes { required: usize, available: usize },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("chunk too large")]
    TooLarge,
    #[error("upstream request failed: {0}")]
    UpstreamReq(reqwest::Error),
    #[error("upstream status {0}")]
    UpstreamStatus(reqwest::StatusCode),
    #[error(transparent)]
    Store(StoreError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl From<KeyError> for ApiError {
    fn from(e: KeyError) -> Self {
        ApiError::InvalidRequest(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            other => ApiError::Store(other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = match self {
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotEnoughNodes { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ChecksumMismatch { .. } => StatusCode::BAD_REQUEST,
            ApiError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UpstreamReq(_) => StatusCode::BAD_GATEWAY,
            ApiError::UpstreamStatus(_) => StatusCode::BAD_GATEWAY,
            ApiError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Any(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status_code, self.to_string()).into_response()
    }
}
