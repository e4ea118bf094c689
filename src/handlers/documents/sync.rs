// handlers/documents/sync.rs - POST/GET /api/documents/sync

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::parse_uuid_field;
use crate::app::AppState;
use crate::database::models::DocumentSync;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::document_service::{DateRange, SyncReport};
use crate::types::SyncType;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub user_id: Option<String>,
    pub sync_type: Option<String>,
    pub document_types: Option<Vec<String>>,
    pub date_range: Option<DateRange>,
}

/// POST /api/documents/sync - check a user's documents against Drive
///
/// ```json
/// { "userId": "...", "syncType": "full", "documentTypes": ["payslip"] }
/// ```
pub async fn start(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> ApiResult<SyncReport> {
    let Json(request) = body?;
    let user_id = parse_uuid_field("userId", request.user_id.as_deref())?;
    let sync_type = request.sync_type.filter(|t| !t.trim().is_empty());
    let (Some(user_id), Some(sync_type)) = (user_id, sync_type) else {
        return Err(ApiError::bad_request("User ID and sync type are required"));
    };
    let sync_type: SyncType = sync_type
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid sync type. Must be full, partial, or incremental"))?;

    if user_id != user.user_id && !user.is_admin() {
        return Err(ApiError::forbidden("Cannot sync documents of another user"));
    }
    if let Some(range) = &request.date_range {
        if range.end < range.start {
            return Err(ApiError::bad_request("Date range end must not be before its start"));
        }
    }

    let report = state
        .documents()
        .sync(user_id, sync_type, request.document_types, request.date_range)
        .await?;
    Ok(ApiResponse::success(report))
}

#[derive(Debug, Default, Deserialize)]
pub struct SyncQuery {
    #[serde(alias = "syncId")]
    pub sync_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum SyncStatus {
    One(DocumentSync),
    History { syncs: Vec<DocumentSync> },
}

/// GET /api/documents/sync - one run by `sync_id`, else the caller's history
pub async fn status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SyncQuery>,
) -> ApiResult<SyncStatus> {
    let documents = state.documents();
    match parse_uuid_field("sync_id", query.sync_id.as_deref())? {
        Some(sync_id) => {
            let owner = (!user.is_admin()).then_some(user.user_id);
            Ok(ApiResponse::success(SyncStatus::One(documents.get_sync(sync_id, owner).await?)))
        }
        None => Ok(ApiResponse::success(SyncStatus::History {
            syncs: documents.list_syncs(user.user_id).await?,
        })),
    }
}
