// handlers/health.rs - GET / and GET /health

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde_json::{json, Value};

use crate::app::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/", get(root)).route("/health", get(health))
}

/// GET / - service descriptor
pub async fn root(State(state): State<AppState>) -> Json<Value> {
    let version = env!("CARGO_PKG_VERSION");

    Json(json!({
        "success": true,
        "data": {
            "name": "BuffrLend API",
            "version": version,
            "description": "Lending platform backend: loans, KYC documents, CRM and WhatsApp",
            "environment": format!("{:?}", state.config.environment),
            "url": state.config.server.public_url,
            "endpoints": {
                "health": "/health (public)",
                "auth": "/auth/session, /auth/refresh (public - token exchange)",
                "calculator": "/api/calculator/* (public)",
                "loans": "/api/loans/*, /api/partners (protected)",
                "documents": "/api/documents/* (protected)",
                "crm": "/api/crm/* (protected)",
                "whatsapp": "/api/whatsapp/* (protected, webhook public)"
            },
            "integrations": {
                "store": state.store.backend_name(),
                "google_drive": state.drive.is_some(),
                "whatsapp": state.messenger.is_some()
            }
        }
    }))
}

/// GET /health - 200 when the store answers, 503 otherwise
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let timestamp = chrono::Utc::now().to_rfc3339();

    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "database": "connected",
                "store": state.store.backend_name(),
                "timestamp": timestamp
            })),
        ),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "degraded",
                    "database": "unreachable",
                    "store": state.store.backend_name(),
                    "timestamp": timestamp
                })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn health_reports_memory_store() {
        let app = TestApp::new();
        let (status, body) = app.get("/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["store"], "memory");
    }

    #[tokio::test]
    async fn root_lists_integrations() {
        let app = TestApp::new().without_drive();
        let (status, body) = app.get("/", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["name"], "BuffrLend API");
        assert_eq!(body["data"]["integrations"]["google_drive"], false);
        assert_eq!(body["data"]["integrations"]["whatsapp"], true);
    }

    #[tokio::test]
    async fn responses_carry_security_headers() {
        let app = TestApp::new();
        let (_, headers, _) = app
            .call(crate::testing::request(axum::http::Method::GET, "/health", None, None))
            .await;
        assert_eq!(headers["x-content-type-options"], "nosniff");
        assert_eq!(headers["x-frame-options"], "DENY");
    }
}
