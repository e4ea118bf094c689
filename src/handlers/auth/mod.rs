// handlers/auth/mod.rs - token exchange, refresh and session management

use axum::{
    routing::{get, post},
    Router,
};

use crate::app::AppState;

pub mod session;
pub mod tokens;

/// Token acquisition; no JWT required
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/session", post(session::exchange))
        .route("/auth/refresh", post(session::refresh))
}

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/whoami", get(session::whoami))
        .route("/api/auth/logout", post(session::logout))
        .route("/api/auth/revoke-all", post(tokens::revoke_all))
        .route("/api/admin/tokens/cleanup", post(tokens::cleanup))
}
