pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;
use crate::sync::handlers;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Mailbox connections
        .route("/api/v1/connections", post(handlers::handle_create_connection))
        .route("/api/v1/connections/:id", get(handlers::handle_get_connection))
        .route(
            "/api/v1/connections/:id/candidates",
            get(handlers::handle_list_candidates),
        )
        // Sync
        .route(
            "/api/v1/sync/connections/:id",
            post(handlers::handle_sync_connection),
        )
        .route("/api/v1/sync/run", post(handlers::handle_sync_all))
        // Merchant mappings
        .route(
            "/api/v1/merchants/resolve",
            get(handlers::handle_resolve_merchant),
        )
        .route(
            "/api/v1/merchants/corrections",
            post(handlers::handle_merchant_correction),
        )
        .with_state(state)
}
