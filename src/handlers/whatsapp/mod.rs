// handlers/whatsapp/mod.rs - outbound messaging, templates, analytics and the Twilio webhook

use axum::{
    routing::{get, post},
    Router,
};

use crate::app::AppState;

pub mod messages;
pub mod webhook;

pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/api/whatsapp/send", post(messages::send))
        .route("/api/whatsapp/templates", get(messages::templates))
        .route("/api/whatsapp/analytics", get(messages::analytics))
        .route("/api/whatsapp/communications/:customer_id", get(messages::communications))
}

/// Twilio posts here without a bearer token
pub fn public_routes() -> Router<AppState> {
    Router::new().route("/api/whatsapp/webhook", post(webhook::receive))
}
