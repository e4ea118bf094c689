// handlers/documents/upload.rs - POST/GET /api/documents/upload

use axum::{
    extract::{multipart::MultipartRejection, Multipart, Query, State},
    Extension,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::parse_uuid_field;
use crate::app::AppState;
use crate::database::models::Document;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::document_service::{UploadRequest, UploadedDocument};
use crate::types::DocumentType;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document: UploadedDocument,
}

/// The target user: the caller unless an admin names someone else
fn target_user(user: &AuthUser, requested: Option<Uuid>) -> Result<Uuid, ApiError> {
    match requested {
        Some(id) if id != user.user_id && !user.is_admin() => {
            Err(ApiError::forbidden("Cannot access documents of another user"))
        }
        Some(id) => Ok(id),
        None => Ok(user.user_id),
    }
}

/// POST /api/documents/upload - multipart form with `file`, `userId`,
/// `loanApplicationId` and `documentType`
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "document": {
///       "id": "...",
///       "file_id": "1AbC...",
///       "file_url": "https://drive.google.com/file/d/1AbC.../view",
///       "document_type": "payslip",
///       "verification_status": "pending"
///     }
///   },
///   "message": "Document uploaded successfully"
/// }
/// ```
pub async fn upload(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<UploadResponse> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut file: Option<(String, String, Vec<u8>)> = None;
    let mut user_id = None;
    let mut loan_application_id = None;
    let mut declared_type = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let mime_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let content = field.bytes().await?;
                file = Some((file_name, mime_type, content.to_vec()));
            }
            Some("userId") => user_id = parse_uuid_field("userId", Some(&field.text().await?))?,
            Some("loanApplicationId") => {
                loan_application_id = parse_uuid_field("loanApplicationId", Some(&field.text().await?))?
            }
            Some("documentType") => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    let parsed = text.trim().parse::<DocumentType>().map_err(|_| {
                        ApiError::invalid_field("Invalid input data", "documentType", "unknown document type")
                    })?;
                    declared_type = Some(parsed);
                }
            }
            _ => {}
        }
    }

    let (file_name, mime_type, content) = file
        .filter(|(_, _, content)| !content.is_empty())
        .ok_or_else(|| ApiError::bad_request("No file provided"))?;
    let user_id = target_user(&user, user_id)?;

    let document = state
        .documents()
        .upload(UploadRequest {
            user_id,
            loan_application_id,
            declared_type,
            file_name,
            mime_type,
            content,
        })
        .await?;

    Ok(ApiResponse::success(UploadResponse { document }).with_message("Document uploaded successfully"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub user_id: Option<String>,
    pub loan_application_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DocumentList {
    pub documents: Vec<Document>,
}

/// GET /api/documents/upload - documents of a user, optionally for one application
pub async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<ListQuery>,
) -> ApiResult<DocumentList> {
    let requested = parse_uuid_field("userId", query.user_id.as_deref())?;
    let loan_application_id = parse_uuid_field("loanApplicationId", query.loan_application_id.as_deref())?;
    let user_id = target_user(&user, requested)?;

    let documents = state
        .documents()
        .list_user_documents(user_id, loan_application_id)
        .await?;
    Ok(ApiResponse::success(DocumentList { documents }))
}

#[cfg(test)]
mod tests {
    use crate::testing::{multipart_request, TestApp};
    use crate::types::UserRole;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn upload_routes_by_classified_type() {
        let app = TestApp::new();
        let (profile, token) = app.user(UserRole::User).await;

        let request = multipart_request(
            "/api/documents/upload",
            Some(&token),
            &[("documentType", "bank_statement")],
            Some(("march_payslip.pdf", "application/pdf", b"%PDF-1.4 payslip")),
        );
        let (status, _, body) = app.call(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Document uploaded successfully");
        let document = &body["data"]["document"];
        assert_eq!(document["document_type"], "payslip");
        assert_eq!(document["verification_status"], "pending");

        let file_id = document["file_id"].as_str().unwrap();
        let payslips = app.state.config.google_drive.folder_routing.payslips.clone();
        assert_eq!(app.drive.folder_of(file_id).await, Some(payslips));

        let (status, body) = app
            .get(&format!("/api/documents/upload?userId={}", profile.id), Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["documents"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upload_without_file_is_rejected() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::User).await;
        let request = multipart_request("/api/documents/upload", Some(&token), &[("documentType", "payslip")], None);
        let (status, _, body) = app.call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No file provided");
    }

    #[tokio::test]
    async fn upload_rejects_bad_ids_and_foreign_users() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::User).await;
        let file = Some(("id.pdf", "application/pdf", b"%PDF".as_slice()));

        let request = multipart_request("/api/documents/upload", Some(&token), &[("userId", "nope")], file);
        let (status, _, body) = app.call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Invalid input data");

        let other = uuid::Uuid::new_v4().to_string();
        let request = multipart_request("/api/documents/upload", Some(&token), &[("userId", &other)], file);
        let (status, _, _) = app.call(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn upload_without_drive_is_unavailable() {
        let app = TestApp::new().without_drive();
        let (_, token) = app.user(UserRole::User).await;
        let request = multipart_request(
            "/api/documents/upload",
            Some(&token),
            &[],
            Some(("id.pdf", "application/pdf", b"%PDF")),
        );
        let (status, _, body) = app.call(request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "Google Drive service unavailable");
    }

    #[tokio::test]
    async fn executable_uploads_are_refused() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::User).await;
        let request = multipart_request(
            "/api/documents/upload",
            Some(&token),
            &[],
            Some(("setup.exe", "application/pdf", b"MZ")),
        );
        let (status, _, body) = app.call(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "File type not allowed for security reasons");
    }
}
