// handlers/auth/tokens.rs - bulk token revocation and cleanup

use axum::{extract::State, Extension};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};

/// POST /api/auth/revoke-all - revoke every refresh token of the caller
pub async fn revoke_all(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    let revoked = state.jwt.revoke_all_user_tokens(user.user_id).await?;
    Ok(ApiResponse::success(json!({ "revoked": revoked })))
}

/// POST /api/admin/tokens/cleanup - delete expired blacklist and refresh rows
pub async fn cleanup(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Value> {
    user.require_admin()?;
    let removed = state.jwt.cleanup_expired_tokens().await?;
    Ok(ApiResponse::success(json!({ "removed": removed })))
}
