use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    routing::post,
};
use serde::Deserialize;
use std::time::Duration;
use tokio::time::sleep;

use crate::state::NodeState;
use common::error::ApiError;

/// Fault injection state for testing
#[derive(Debug, Default)]
pub struct FaultInjector {
    // Store failures
    pub fail_store_once: AtomicBool,
    pub fail_store_always: AtomicBool,
    pub fail_store_chunks: Mutex<HashSet<u64>>,

    // Read failures
    pub fail_get_always: AtomicBool,

    // Latency injection
    pub inject_latency_ms: AtomicU64,

    // Store requests seen, per chunk index
    store_attempts: Mutex<HashMap<u64, u64>>,
}

impl FaultInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the store of `chunk_index` should fail
    pub fn should_fail_store(&self, chunk_index: u64) -> bool {
        if self.fail_store_always.load(Ordering::Relaxed) {
            return true;
        }

        if self
            .fail_store_chunks
            .lock()
            .map(|chunks| chunks.contains(&chunk_index))
            .unwrap_or(false)
        {
            return true;
        }

        self.fail_store_once.swap(false, Ordering::Relaxed)
    }

    /// Counts a store request for `chunk_index`, injected failures included.
    pub fn record_store_attempt(&self, chunk_index: u64) {
        if let Ok(mut attempts) = self.store_attempts.lock() {
            *attempts.entry(chunk_index).or_default() += 1;
        }
    }

    pub fn store_attempts(&self, chunk_index: u64) -> u64 {
        self.store_attempts
            .lock()
            .map(|attempts| attempts.get(&chunk_index).copied().unwrap_or(0))
            .unwrap_or(0)
    }

    pub fn should_fail_get(&self) -> bool {
        self.fail_get_always.load(Ordering::Relaxed)
    }

    /// Apply latency if configured
    pub async fn apply_latency(&self) {
        let latency_ms = self.inject_latency_ms.load(Ordering::Relaxed);
        if latency_ms > 0 {
            sleep(Duration::from_millis(latency_ms)).await;
        }
    }

    pub fn fail_chunk(&self, chunk_index: u64) {
        if let Ok(mut chunks) = self.fail_store_chunks.lock() {
            chunks.insert(chunk_index);
        }
    }

    /// Reset all fault injection flags
    pub fn reset(&self) {
        self.fail_store_once.store(false, Ordering::Relaxed);
        self.fail_store_always.store(false, Ordering::Relaxed);
        if let Ok(mut chunks) = self.fail_store_chunks.lock() {
            chunks.clear();
        }
        self.fail_get_always.store(false, Ordering::Relaxed);
        self.inject_latency_ms.store(0, Ordering::Relaxed);
        if let Ok(mut attempts) = self.store_attempts.lock() {
            attempts.clear();
        }
    }
}

#[derive(Deserialize)]
pub struct FaultQuery {
    #[serde(default)]
    pub once: bool,
    #[serde(default)]
    pub always: bool,
    #[serde(default)]
    pub chunk_index: Option<u64>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
}

/// Admin routes, mounted only when the node runs with `--enable-fault-injection`.
pub fn fault_router() -> Router<NodeState> {
    Router::new()
        .route("/admin/fail/store", post(fail_store))
        .route("/admin/fail/get", post(fail_get))
        .route("/admin/inject/latency", post(inject_latency))
        .route("/admin/reset", post(reset_faults))
}

/// POST /admin/fail/store?once=true | always=true | chunk_index=N -> store returns 500.
pub async fn fail_store(
    Query(params): Query<FaultQuery>,
    State(ctx): State<NodeState>,
) -> Result<StatusCode, ApiError> {
    if params.once {
        ctx.fault_injector
            .fail_store_once
            .store(true, Ordering::Relaxed);
    }
    if params.always {
        ctx.fault_injector
            .fail_store_always
            .store(true, Ordering::Relaxed);
    }
    if let Some(chunk_index) = params.chunk_index {
        ctx.fault_injector.fail_chunk(chunk_index);
    }
    Ok(StatusCode::OK)
}

/// POST /admin/fail/get?always=true -> every read returns 500.
pub async fn fail_get(
    Query(params): Query<FaultQuery>,
    State(ctx): State<NodeState>,
) -> Result<StatusCode, ApiError> {
    ctx.fault_injector
        .fail_get_always
        .store(params.always, Ordering::Relaxed);
    Ok(StatusCode::OK)
}

/// POST /admin/inject/latency?latency_ms=1000 -> delay every chunk operation
pub async fn inject_latency(
    Query(params): Query<FaultQuery>,
    State(ctx): State<NodeState>,
) -> Result<StatusCode, ApiError> {
    if let Some(latency_ms) = params.latency_ms {
        ctx.fault_injector
            .inject_latency_ms
            .store(latency_ms, Ordering::Relaxed);
    }
    Ok(StatusCode::OK)
}

/// POST /admin/reset -> reset all fault injection flags
pub async fn reset_faults(State(ctx): State<NodeState>) -> Result<StatusCode, ApiError> {
    ctx.fault_injector.reset();
    Ok(StatusCode::OK)
}
