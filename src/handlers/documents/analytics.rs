// handlers/documents/analytics.rs - GET /api/documents/analytics, GET /api/documents/drive/status

use axum::{
    extract::{Query, State},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::parse_uuid_field;
use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::document_service::{AnalyticsQuery, DocumentAnalytics, DriveStatus};
use crate::types::{DocumentType, UserRole, VerificationStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsParams {
    pub user_id: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub document_type: Option<DocumentType>,
    pub verification_status: Option<VerificationStatus>,
}

/// GET /api/documents/analytics - the caller's documents; admins may pass `userId` or omit it for everyone
pub async fn analytics(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<AnalyticsParams>,
) -> ApiResult<DocumentAnalytics> {
    let requested = parse_uuid_field("userId", params.user_id.as_deref())?;
    let user_id = if user.is_admin() {
        requested
    } else {
        if requested.is_some_and(|id| id != user.user_id) {
            user.require_role(UserRole::Admin)?;
        }
        Some(user.user_id)
    };

    let analytics = state
        .documents()
        .analytics(AnalyticsQuery {
            user_id,
            start: params.start_date,
            end: params.end_date,
            document_type: params.document_type,
            verification_status: params.verification_status,
        })
        .await?;
    Ok(ApiResponse::success(analytics))
}

/// GET /api/documents/drive/status - admin check that the Drive credentials still work
pub async fn drive_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<DriveStatus> {
    user.require_role(UserRole::Admin)?;
    let status = state.documents().drive_status().await?;
    let message = if status.connected {
        "Google Drive connection successful"
    } else {
        "Google Drive connection failed"
    };
    Ok(ApiResponse::success(status).with_message(message))
}

#[cfg(test)]
mod tests {
    use crate::testing::{multipart_request, TestApp};
    use crate::types::UserRole;
    use axum::http::StatusCode;

    async fn upload(app: &TestApp, token: &str, name: &str) {
        let request = multipart_request(
            "/api/documents/upload",
            Some(token),
            &[],
            Some((name, "application/pdf", b"%PDF-1.4")),
        );
        let (status, _, _) = app.call(request).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn users_see_their_own_analytics() {
        let app = TestApp::new();
        let (owner, token) = app.user(UserRole::User).await;
        let (_, other) = app.user(UserRole::User).await;
        upload(&app, &token, "payslip.pdf").await;
        upload(&app, &token, "passport.pdf").await;
        upload(&app, &other, "payslip.pdf").await;

        let (status, body) = app.get("/api/documents/analytics", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total_documents"], 2);
        assert_eq!(body["data"]["pending_documents"], 2);
        assert_eq!(body["data"]["document_types"]["passport"], 1);
        assert_eq!(body["data"]["file_size_stats"]["largest_file"], 8);

        let uri = format!("/api/documents/analytics?userId={}", uuid::Uuid::new_v4());
        let (status, body) = app.get(&uri, Some(&token)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "Insufficient role");

        let uri = format!("/api/documents/analytics?userId={}", owner.id);
        let (status, _) = app.get(&uri, Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn admins_see_everyone_and_dates_are_checked() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::User).await;
        let (_, admin) = app.user(UserRole::Admin).await;
        upload(&app, &token, "payslip.pdf").await;
        upload(&app, &token, "payslip-2.pdf").await;

        let (_, body) = app.get("/api/documents/analytics?documentType=payslip", Some(&admin)).await;
        assert_eq!(body["data"]["total_documents"], 2);
        assert_eq!(body["data"]["upload_trends"].as_array().unwrap().len(), 1);

        let (status, body) = app
            .get(
                "/api/documents/analytics?startDate=2026-02-01T00:00:00Z&endDate=2026-01-01T00:00:00Z",
                Some(&admin),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "End date must be after start date");
    }

    #[tokio::test]
    async fn drive_status_is_admin_only() {
        let app = TestApp::new();
        let (_, user) = app.user(UserRole::User).await;
        let (_, admin) = app.user(UserRole::Admin).await;

        let (status, _) = app.get("/api/documents/drive/status", Some(&user)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, body) = app.get("/api/documents/drive/status", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["connected"], true);
        assert_eq!(body["data"]["account"]["emailAddress"], "fake-drive@example.com");

        app.drive.go_offline();
        let (_, body) = app.get("/api/documents/drive/status", Some(&admin)).await;
        assert_eq!(body["data"]["connected"], false);
        assert_eq!(body["message"], "Google Drive connection failed");

        let app = app.without_drive();
        let (status, _) = app.get("/api/documents/drive/status", Some(&admin)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }
}
