// handlers/loans/applications.rs - /api/loans/applications and status changes

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::LoanApplication;
use crate::middleware::{ApiResponse, ApiResult, AuthUser, Pagination};
use crate::services::loan_service::ApplicationInput;
use crate::services::whatsapp_service::MessageContext;
use crate::types::ApplicationStatus;

#[derive(Debug, Default, Deserialize)]
pub struct ApplicationQuery {
    pub status: Option<ApplicationStatus>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct ApplicationPage {
    pub applications: Vec<LoanApplication>,
    pub pagination: Pagination,
}

/// GET /api/loans/applications - own applications, or all of them for admins
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ApplicationQuery>,
) -> ApiResult<ApplicationPage> {
    let (applications, pagination) = state
        .loans()
        .list_applications(&user, query.status, query.page, query.limit)
        .await?;
    Ok(ApiResponse::success(ApplicationPage {
        applications,
        pagination,
    }))
}

/// POST /api/loans/applications - application without a priced loan (drafts)
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<ApplicationInput>, JsonRejection>,
) -> ApiResult<LoanApplication> {
    let Json(input) = body?;
    let application = state.loans().create_application(user.user_id, input).await?;
    Ok(ApiResponse::created(application))
}

/// GET /api/loans/applications/:id
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanApplication> {
    let application = state.loans().get_application(&user, id).await?;
    Ok(ApiResponse::success(application))
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: ApplicationStatus,
}

/// PATCH /api/loans/applications/:id/status - admin decision
///
/// The CRM mirror and the approval message run after the update is stored;
/// their failures are logged and do not fail the request.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Result<Json<StatusRequest>, JsonRejection>,
) -> ApiResult<LoanApplication> {
    user.require_admin()?;
    let Json(request) = body?;
    let change = state.loans().update_application_status(id, request.status).await?;
    let application = change.application;

    if let Err(e) = state
        .crm()
        .sync_loan_application_status(
            application.id,
            application.user_id,
            &change.old_status,
            &application.status,
            json!({ "changed_by": user.user_id }),
        )
        .await
    {
        tracing::warn!("CRM sync failed for application {}: {}", application.id, e);
    }

    if request.status == ApplicationStatus::Approved {
        notify_approval(&state, &application).await;
    }

    Ok(ApiResponse::success(application).with_message("Application status updated successfully"))
}

async fn notify_approval(state: &AppState, application: &LoanApplication) {
    let profile = match state.store.get_profile(application.user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!("Could not load applicant {}: {}", application.user_id, e);
            return;
        }
    };

    let mut params = HashMap::new();
    params.insert(
        "customer_name".to_string(),
        profile.as_ref().map(|p| p.display_name()).unwrap_or_else(|| "Customer".to_string()),
    );
    params.insert("amount".to_string(), application.loan_amount.to_string());
    params.insert("term".to_string(), application.loan_term.to_string());

    state
        .whatsapp()
        .notify(
            profile.as_ref().and_then(|p| p.phone_number.as_deref()),
            "loan_approved",
            params,
            MessageContext {
                customer_id: Some(application.user_id),
                loan_id: None,
            },
        )
        .await;
}

#[cfg(test)]
mod tests {
    use crate::database::CrmStore;
    use crate::testing::TestApp;
    use crate::types::UserRole;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn users_only_list_their_own() {
        let app = TestApp::new();
        let (_, alice) = app.user(UserRole::User).await;
        let (_, bob) = app.user(UserRole::User).await;
        let (_, admin) = app.user(UserRole::Admin).await;

        for token in [&alice, &alice, &bob] {
            let (status, _) = app
                .post("/api/loans/applications", Some(token), json!({ "loan_amount": 1000, "loan_term": 1 }))
                .await;
            assert_eq!(status, StatusCode::CREATED);
        }

        let (_, body) = app.get("/api/loans/applications", Some(&alice)).await;
        assert_eq!(body["data"]["applications"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["pagination"]["total"], 2);

        let (_, body) = app.get("/api/loans/applications?limit=2", Some(&admin)).await;
        assert_eq!(body["data"]["applications"].as_array().unwrap().len(), 2);
        assert_eq!(body["data"]["pagination"]["total"], 3);
        assert_eq!(body["data"]["pagination"]["totalPages"], 2);
    }

    #[tokio::test]
    async fn draft_status_is_kept() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::User).await;
        let (_, body) = app
            .post(
                "/api/loans/applications",
                Some(&token),
                json!({ "loan_amount": 1000, "loan_term": 1, "status": "draft" }),
            )
            .await;
        assert_eq!(body["data"]["status"], "draft");

        let (_, body) = app.get("/api/loans/applications?status=pending", Some(&token)).await;
        assert_eq!(body["data"]["pagination"]["total"], 0);
    }

    #[tokio::test]
    async fn approval_syncs_crm_and_notifies_applicant() {
        let app = TestApp::new();
        let (applicant, token) = app.user(UserRole::User).await;
        let (_, admin) = app.user(UserRole::Admin).await;

        let (_, created) = app
            .post("/api/loans", Some(&token), json!({ "loan_amount": 3000, "loan_term": 3 }))
            .await;
        let id = created["data"]["application"]["id"].as_str().unwrap().to_string();
        let uri = format!("/api/loans/applications/{}/status", id);

        let (status, _) = app.patch(&uri, Some(&token), json!({ "status": "approved" })).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.patch(&uri, Some(&admin), json!({ "status": "approved" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "approved");

        let stage = app.store.open_journey_stage(applicant.id).await.unwrap();
        assert_eq!(stage.map(|s| s.stage), Some("approval".to_string()));

        let sent = app.sender.sent().await;
        assert!(sent.last().unwrap().1.starts_with("Loan Approved!"));
    }

    #[tokio::test]
    async fn unknown_status_is_rejected() {
        let app = TestApp::new();
        let (_, admin) = app.user(UserRole::Admin).await;
        let uri = format!("/api/loans/applications/{}/status", uuid::Uuid::new_v4());

        let (status, _) = app.patch(&uri, Some(&admin), json!({ "status": "maybe" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = app.patch(&uri, Some(&admin), json!({ "status": "approved" })).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Loan application not found");
    }
}
