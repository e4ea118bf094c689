// handlers/documents/mod.rs - KYC document upload, Drive sync, admin review and reporting

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::get,
    Router,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::rate_limit::upload_rate_limit_middleware;

pub mod analytics;
pub mod audit;
pub mod sync;
pub mod upload;
pub mod verify;

/// Multipart framing on top of the file itself
const MULTIPART_OVERHEAD: usize = 64 * 1024;

pub fn routes(state: AppState) -> Router<AppState> {
    let mut upload = Router::new()
        .route("/api/documents/upload", get(upload::list).post(upload::upload))
        .layer(DefaultBodyLimit::max(
            state.config.google_drive.max_file_size + MULTIPART_OVERHEAD,
        ));
    if state.config.api.enable_rate_limiting {
        upload = upload.route_layer(middleware::from_fn_with_state(state.clone(), upload_rate_limit_middleware));
    }

    Router::new()
        .merge(upload)
        .route("/api/documents/sync", get(sync::status).post(sync::start))
        .route("/api/documents/verify", get(verify::queue).post(verify::review))
        .route("/api/documents/analytics", get(analytics::analytics))
        .route("/api/documents/audit", get(audit::audit))
        .route("/api/documents/drive/status", get(analytics::drive_status))
}

/// Parse an optional UUID form/query field, naming the field on failure
pub(crate) fn parse_uuid_field(field: &str, value: Option<&str>) -> Result<Option<Uuid>, ApiError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ApiError::invalid_field("Invalid input data", field, "must be a UUID")),
    }
}
