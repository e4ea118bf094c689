// handlers/documents/verify.rs - admin review of uploaded documents

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::{header, HeaderMap},
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use super::parse_uuid_field;
use crate::app::AppState;
use crate::database::models::Document;
use crate::error::ApiError;
use crate::middleware::{auth::client_address, ApiResponse, ApiResult, AuthUser, Pagination};
use crate::services::document_service::{ReviewAction, ReviewOutcome, ReviewRequest, Reviewer};
use crate::types::{DocumentType, VerificationStatus};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    pub document_id: Option<String>,
    pub action: Option<String>,
    pub reason: Option<String>,
    pub admin_notes: Option<String>,
}

/// POST /api/documents/verify - verify or reject, moving the Drive file
///
/// ```json
/// { "documentId": "...", "action": "reject", "reason": "Blurry scan" }
/// ```
pub async fn review(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    headers: HeaderMap,
    body: Result<Json<VerifyRequest>, JsonRejection>,
) -> ApiResult<ReviewOutcome> {
    user.require_admin()?;
    let Json(request) = body?;

    let document_id = parse_uuid_field("documentId", request.document_id.as_deref())?;
    let (Some(document_id), Some(action)) = (document_id, request.action) else {
        return Err(ApiError::bad_request("Document ID and action are required"));
    };
    let action = match action.as_str() {
        "verify" => ReviewAction::Verify,
        "reject" => ReviewAction::Reject,
        _ => return Err(ApiError::bad_request("Invalid action. Must be verify or reject")),
    };

    let reviewer = Reviewer {
        admin_id: user.user_id,
        ip_address: Some(client_address(&headers)),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    };
    let outcome = state
        .documents()
        .review(
            ReviewRequest {
                document_id,
                action,
                reason: request.reason,
                admin_notes: request.admin_notes,
            },
            reviewer,
        )
        .await?;

    let message = outcome.message.clone();
    Ok(ApiResponse::success(outcome).with_message(message))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueQuery {
    pub status: Option<VerificationStatus>,
    pub document_type: Option<DocumentType>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ReviewQueue {
    pub documents: Vec<Document>,
    pub pagination: Pagination,
}

/// GET /api/documents/verify - admin review queue
pub async fn queue(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<QueueQuery>,
) -> ApiResult<ReviewQueue> {
    user.require_admin()?;
    let (page, limit) = Pagination::normalize(query.page, query.limit, 20);
    let (documents, pagination) = state
        .documents()
        .list_for_review(query.status, query.document_type, page, limit)
        .await?;
    Ok(ApiResponse::success(ReviewQueue { documents, pagination }))
}
