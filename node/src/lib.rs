pub mod chunk_store;
pub mod fault_injection;
pub mod heartbeat;
pub mod identity;
pub mod routes;
pub mod state;

use axum::{
    Router, middleware,
    routing::{delete, get, put},
};

use common::trace_middleware::trace_context_middleware;

use crate::fault_injection::fault_router;
use crate::routes::{admin_chunks, delete_chunk, get_chunk, store_chunk};
use crate::state::NodeState;

/// Chunk service routes. The body size limit is enforced while streaming, so
/// no extractor limit applies to `/store-chunk`.
pub fn router(state: NodeState, enable_fault_injection: bool) -> Router {
    let mut app = Router::new()
        .route("/store-chunk", put(store_chunk))
        .route("/get-chunk", get(get_chunk))
        .route("/delete-chunk", delete(delete_chunk))
        .route("/admin/chunks", get(admin_chunks));

    // Fault injection endpoints (test-only)
    if enable_fault_injection {
        app = app.merge(fault_router());
    }

    app.layer(middleware::from_fn(trace_context_middleware))
        .with_state(state)
}
