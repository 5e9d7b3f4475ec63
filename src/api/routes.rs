//! Route Definitions
//!
//! Maps URLs to handlers with type-safe routing.

use super::{
    handlers::*,
    middleware::metrics_middleware,
    monitoring::metrics_handler,
    websocket::websocket_handler,
};
use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))

        // Game lifecycle
        .route("/games/start", post(start_game_handler))
        .route("/games/end", post(end_game_handler))
        .route("/games/contribute", post(contribute_handler))
        .route("/games/:variant", get(game_status_handler))

        // Ledger reads
        .route("/instances/:id/entries", get(entries_handler))
        .route("/instances/:id/settlement", get(settlement_handler))

        // Live progress
        .route("/ws", get(websocket_handler))

        // Metrics endpoint for Prometheus
        .route("/metrics", get(metrics_handler))

        .layer(from_fn_with_state(state.clone(), metrics_middleware))
        .with_state(state)
}
