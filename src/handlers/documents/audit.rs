// handlers/documents/audit.rs - GET /api/documents/audit

use axum::{
    extract::{Query, State},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::parse_uuid_field;
use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::document_service::{AuditQuery, AuditTrail};

/// Held by auditors who are not admins
pub const AUDIT_PERMISSION: &str = "documents:audit";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditParams {
    pub user_id: Option<String>,
    pub document_id: Option<String>,
    pub action_type: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    #[serde(default)]
    pub include_stats: bool,
}

/// GET /api/documents/audit - review actions on documents, newest first
///
/// `userId` filters by the acting admin; `includeStats=true` adds per-action
/// and per-admin counts over the whole filtered trail.
pub async fn audit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<AuditParams>,
) -> ApiResult<AuditTrail> {
    user.require_permissions(&[AUDIT_PERMISSION])?;

    let trail = state
        .documents()
        .audit_trail(AuditQuery {
            admin_id: parse_uuid_field("userId", params.user_id.as_deref())?,
            document_id: parse_uuid_field("documentId", params.document_id.as_deref())?,
            action: params.action_type.filter(|a| !a.trim().is_empty()),
            start: params.start_date,
            end: params.end_date,
            limit: params.limit.unwrap_or(50),
            offset: params.offset.unwrap_or(0),
            include_stats: params.include_stats,
        })
        .await?;
    Ok(ApiResponse::success(trail))
}
