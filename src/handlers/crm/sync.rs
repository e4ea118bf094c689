// handlers/crm/sync.rs - POST /api/crm/sync, POST /api/crm/automation/run

use axum::{
    extract::{rejection::JsonRejection, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::Value;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::crm_service::AutomationReport;

#[derive(Debug, Deserialize)]
pub struct SyncRequest {
    pub action: String,
    #[serde(default)]
    pub data: Value,
}

/// POST /api/crm/sync - run one CRM sync action
///
/// Actions: `sync_loan_status`, `sync_new_customer`, `update_health_score`,
/// `sync_partner_performance`.
///
/// ```json
/// { "action": "update_health_score", "data": { "userId": "..." } }
/// ```
pub async fn run(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<SyncRequest>, JsonRejection>,
) -> ApiResult<Value> {
    user.require_admin()?;
    let Json(request) = body?;
    let result = state.crm().run_sync(&request.action, request.data).await?;
    tracing::info!("CRM sync {} run by {}", request.action, user.user_id);
    Ok(ApiResponse::success(result).with_message("CRM sync completed"))
}

/// POST /api/crm/automation/run - run the daily automation pass now
pub async fn automation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<AutomationReport> {
    user.require_admin()?;
    let report = state.crm().run_daily_automation(chrono::Utc::now()).await?;
    Ok(ApiResponse::success(report).with_message("CRM automation completed"))
}
