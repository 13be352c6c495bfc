//! Route Definitions

use super::handlers::*;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

/// Build the API router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Session lifecycle
        .route("/api/games/launch", post(launch_handler))
        .route("/api/game-sessions/:token/end", post(end_session_handler))
        // Client-reported flow
        .route("/api/games/bet", post(bet_handler))
        .route("/api/games/win", post(win_handler))
        .route("/api/games/rollback/:round_id", post(rollback_handler))
        // Server-authoritative spin
        .route("/api/games/spin", post(spin_handler))
        .route("/api/game-sessions/:token/spin", post(session_spin_handler))
        // Queries
        .route("/api/balance", get(balance_handler))
        .route("/api/rounds/:round_id", get(round_handler))
        .route("/api/ledger", get(ledger_handler))
        .with_state(state)
}
