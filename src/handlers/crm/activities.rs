// handlers/crm/activities.rs - GET /api/crm/activities/recent

use axum::{
    extract::{Query, State},
    Extension,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::crm_service::RecentActivity;

#[derive(Debug, Default, Deserialize)]
pub struct RecentQuery {
    pub limit: Option<i64>,
}

/// Latest customer communications, newest first (default 10, at most 100)
pub async fn recent(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<RecentQuery>,
) -> ApiResult<Vec<RecentActivity>> {
    user.require_admin()?;
    let activities = state.crm().recent_activities(query.limit.unwrap_or(10)).await?;
    Ok(ApiResponse::success(activities))
}
