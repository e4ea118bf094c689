//! KYC document intake: upload to Drive, sync checks and admin review.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::whatsapp_service::{MessageContext, WhatsAppService};
use crate::config::GoogleDriveConfig;
use crate::database::models::{
    ActivityFilter, AdminActivity, Document, DocumentFilter, DocumentReview, DocumentSync, NewAdminActivity,
    NewDocument,
};
use crate::database::{DatabaseError, Store};
use crate::integrations::google_drive::{classify_document, is_supported_mime_type, target_folder, DocumentStorage};
use crate::middleware::Pagination;
use crate::types::{DocumentType, SyncType, VerificationStatus};

const BLOCKED_EXTENSIONS: [&str; 8] = [".exe", ".bat", ".cmd", ".com", ".pif", ".scr", ".vbs", ".js"];

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Google Drive service unavailable")]
    StorageUnavailable,

    #[error("Drive upload failed: {0}")]
    Upload(String),

    #[error("Drive update failed: {0}")]
    DriveUpdate(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

pub struct UploadRequest {
    pub user_id: Uuid,
    pub loan_application_id: Option<Uuid>,
    pub declared_type: Option<DocumentType>,
    pub file_name: String,
    pub mime_type: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadedDocument {
    pub id: Uuid,
    pub file_id: String,
    pub file_url: String,
    pub document_type: String,
    pub verification_status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub new_documents: i32,
    pub updated_documents: i32,
    pub deleted_documents: i32,
    pub errors: i32,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_id: Option<Uuid>,
    pub documents_synced: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_summary: Option<SyncSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial_success: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_documents: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Verify,
    Reject,
}

impl ReviewAction {
    fn status(self) -> VerificationStatus {
        match self {
            ReviewAction::Verify => VerificationStatus::Verified,
            ReviewAction::Reject => VerificationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub document_id: Uuid,
    pub action: ReviewAction,
    pub reason: Option<String>,
    pub admin_notes: Option<String>,
}

/// The admin performing a review, as recorded in the activity log
#[derive(Debug, Clone)]
pub struct Reviewer {
    pub admin_id: Uuid,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReviewOutcome {
    pub document: Document,
    pub action: ReviewAction,
    pub message: String,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyticsQuery {
    pub user_id: Option<Uuid>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub document_type: Option<DocumentType>,
    pub verification_status: Option<VerificationStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadTrend {
    pub date: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSizeStats {
    pub total_size: i64,
    pub average_size: i64,
    pub largest_file: i64,
    pub smallest_file: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentAnalytics {
    pub total_documents: i64,
    pub verified_documents: i64,
    pub pending_documents: i64,
    pub rejected_documents: i64,
    pub document_types: BTreeMap<String, i64>,
    pub verification_status_distribution: BTreeMap<String, i64>,
    pub upload_trends: Vec<UploadTrend>,
    pub file_size_stats: FileSizeStats,
}

impl DocumentAnalytics {
    fn from_documents(documents: &[Document]) -> Self {
        let mut document_types = BTreeMap::new();
        let mut statuses = BTreeMap::new();
        let mut trends: BTreeMap<String, i64> = BTreeMap::new();
        for document in documents {
            *document_types.entry(document.document_type.clone()).or_insert(0) += 1;
            *statuses.entry(document.verification_status.clone()).or_insert(0) += 1;
            *trends.entry(document.uploaded_at.format("%Y-%m-%d").to_string()).or_insert(0) += 1;
        }

        // Zero-byte rows are placeholders and stay out of the size figures
        let sizes: Vec<i64> = documents.iter().map(|d| d.file_size).filter(|size| *size > 0).collect();
        let file_size_stats = if sizes.is_empty() {
            FileSizeStats::default()
        } else {
            let total_size: i64 = sizes.iter().sum();
            FileSizeStats {
                total_size,
                average_size: (total_size as f64 / sizes.len() as f64).round() as i64,
                largest_file: sizes.iter().copied().max().unwrap_or(0),
                smallest_file: sizes.iter().copied().min().unwrap_or(0),
            }
        };

        let count_of = |status: VerificationStatus| statuses.get(&status.to_string()).copied().unwrap_or(0);
        Self {
            total_documents: documents.len() as i64,
            verified_documents: count_of(VerificationStatus::Verified),
            pending_documents: count_of(VerificationStatus::Pending),
            rejected_documents: count_of(VerificationStatus::Rejected),
            document_types,
            verification_status_distribution: statuses,
            upload_trends: trends.into_iter().map(|(date, count)| UploadTrend { date, count }).collect(),
            file_size_stats,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    pub admin_id: Option<Uuid>,
    pub document_id: Option<Uuid>,
    pub action: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
    pub include_stats: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditDateRange {
    pub earliest: Option<DateTime<Utc>>,
    pub latest: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditStatistics {
    pub total_actions: i64,
    pub action_types: BTreeMap<String, i64>,
    pub user_activity: BTreeMap<String, i64>,
    pub date_range: AuditDateRange,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditTrail {
    pub audit_trail: Vec<AdminActivity>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<AuditStatistics>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DriveStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct DocumentService {
    store: Arc<dyn Store>,
    drive: Option<Arc<dyn DocumentStorage>>,
    config: Arc<GoogleDriveConfig>,
    whatsapp: WhatsAppService,
    admin_number: Option<String>,
}

impl DocumentService {
    pub fn new(
        store: Arc<dyn Store>,
        drive: Option<Arc<dyn DocumentStorage>>,
        config: Arc<GoogleDriveConfig>,
        whatsapp: WhatsAppService,
        admin_number: Option<String>,
    ) -> Self {
        Self {
            store,
            drive,
            config,
            whatsapp,
            admin_number,
        }
    }

    fn drive(&self) -> Result<&dyn DocumentStorage, DocumentError> {
        self.drive.as_deref().ok_or(DocumentError::StorageUnavailable)
    }

    /// Size, MIME type and file-name checks applied before anything is stored
    pub fn validate_file(&self, file_name: &str, mime_type: &str, size: usize) -> Result<(), DocumentError> {
        if size > self.config.max_file_size {
            return Err(DocumentError::Invalid(format!(
                "File size exceeds {}MB limit",
                self.config.max_file_size / (1024 * 1024)
            )));
        }
        if !is_supported_mime_type(&self.config, mime_type) {
            return Err(DocumentError::Invalid("File type not supported".to_string()));
        }
        let lower = file_name.to_lowercase();
        if BLOCKED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext)) {
            return Err(DocumentError::Invalid(
                "File type not allowed for security reasons".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn upload(&self, request: UploadRequest) -> Result<UploadedDocument, DocumentError> {
        self.validate_file(&request.file_name, &request.mime_type, request.content.len())?;
        let drive = self.drive()?;

        // Name-based classification wins; the declared type only fills in when nothing matched
        let document_type = match classify_document(&request.file_name) {
            DocumentType::Other => request.declared_type.unwrap_or(DocumentType::Other),
            classified => classified,
        };
        let folder = target_folder(&self.config.folder_routing, document_type);

        let checksum = format!("{:x}", Sha256::digest(&request.content));
        let file_size = request.content.len() as i64;
        let file = drive
            .upload(&request.file_name, &request.mime_type, request.content, folder)
            .await
            .map_err(|e| DocumentError::Upload(e.to_string()))?;
        let file_url = file.view_url();

        let inserted = self
            .store
            .insert_document(NewDocument {
                user_id: request.user_id,
                loan_application_id: request.loan_application_id,
                file_name: request.file_name.clone(),
                file_type: request.mime_type.clone(),
                file_size,
                checksum: Some(checksum),
                google_drive_file_id: Some(file.id.clone()),
                google_drive_url: Some(file_url.clone()),
                document_type: document_type.to_string(),
                verification_status: VerificationStatus::Pending.to_string(),
            })
            .await;
        let document = match inserted {
            Ok(document) => document,
            Err(e) => {
                // Drop the orphaned upload so Drive never holds a file without a row
                if let Err(delete_err) = drive.delete(&file.id).await {
                    warn!("Could not remove orphaned Drive file {}: {}", file.id, delete_err);
                }
                return Err(e.into());
            }
        };
        info!("Stored {} document {} for {}", document_type, document.id, request.user_id);

        let params = HashMap::from([
            ("user_id".to_string(), request.user_id.to_string()),
            ("document_type".to_string(), document_type.to_string()),
            ("file_name".to_string(), request.file_name),
            ("google_drive_url".to_string(), file_url.clone()),
        ]);
        self.whatsapp
            .notify(
                self.admin_number.as_deref(),
                "document_uploaded",
                params,
                MessageContext::default(),
            )
            .await;

        Ok(UploadedDocument {
            id: document.id,
            file_id: file.id,
            file_url,
            document_type: document.document_type,
            verification_status: document.verification_status,
        })
    }

    pub async fn list_user_documents(
        &self,
        user_id: Uuid,
        loan_application_id: Option<Uuid>,
    ) -> Result<Vec<Document>, DocumentError> {
        let filter = DocumentFilter {
            user_id: Some(user_id),
            loan_application_id,
            ..Default::default()
        };
        Ok(self.store.list_documents(&filter).await?)
    }

    /// Confirm every matching document still exists in Drive and record the run
    pub async fn sync(
        &self,
        user_id: Uuid,
        sync_type: SyncType,
        document_types: Option<Vec<String>>,
        date_range: Option<DateRange>,
    ) -> Result<SyncReport, DocumentError> {
        let drive = self.drive()?;

        let filter = DocumentFilter {
            user_id: Some(user_id),
            document_types,
            uploaded_from: date_range.as_ref().map(|range| range.start),
            uploaded_to: date_range.as_ref().map(|range| range.end),
            ..Default::default()
        };
        let documents = self.store.list_documents(&filter).await?;

        if documents.is_empty() {
            return Ok(SyncReport {
                documents_synced: 0,
                message: Some("No documents found to sync".to_string()),
                ..Default::default()
            });
        }

        let mut synced = 0;
        let mut failed = Vec::new();
        for document in &documents {
            let Some(file_id) = document.google_drive_file_id.as_deref() else {
                failed.push(document.file_name.clone());
                continue;
            };
            match drive.get_file(file_id).await {
                Ok(_) => synced += 1,
                Err(e) => {
                    warn!("Sync check failed for document {}: {}", document.id, e);
                    failed.push(document.file_name.clone());
                }
            }
        }

        let record = self
            .store
            .insert_sync(DocumentSync {
                sync_id: Uuid::new_v4(),
                user_id,
                sync_type: sync_type.to_string(),
                status: if failed.is_empty() { "completed" } else { "partial" }.to_string(),
                documents_synced: synced,
                failed_documents: failed.clone(),
                created_at: Utc::now(),
            })
            .await?;
        info!("{} sync {} for {}: {} ok, {} failed", sync_type, record.sync_id, user_id, synced, failed.len());

        let partial = !failed.is_empty();
        Ok(SyncReport {
            sync_id: Some(record.sync_id),
            documents_synced: synced,
            sync_summary: Some(SyncSummary {
                new_documents: 0,
                updated_documents: synced,
                deleted_documents: 0,
                errors: failed.len() as i32,
            }),
            partial_success: partial.then_some(true),
            failed_documents: partial.then_some(failed),
            message: None,
        })
    }

    /// A sync run visible to `user_id` (any run when `user_id` is `None`)
    pub async fn get_sync(&self, sync_id: Uuid, user_id: Option<Uuid>) -> Result<DocumentSync, DocumentError> {
        self.store
            .get_sync(sync_id)
            .await?
            .filter(|sync| user_id.map_or(true, |owner| sync.user_id == owner))
            .ok_or_else(|| DocumentError::NotFound("Sync not found".to_string()))
    }

    pub async fn list_syncs(&self, user_id: Uuid) -> Result<Vec<DocumentSync>, DocumentError> {
        Ok(self.store.list_syncs(user_id).await?)
    }

    pub async fn review(&self, request: ReviewRequest, reviewer: Reviewer) -> Result<ReviewOutcome, DocumentError> {
        let document = self
            .store
            .get_document(request.document_id)
            .await?
            .ok_or_else(|| DocumentError::NotFound("Document not found".to_string()))?;
        let drive = self.drive()?;

        let routing = &self.config.folder_routing;
        let folder = match request.action {
            ReviewAction::Verify => &routing.verified,
            ReviewAction::Reject => &routing.rejected,
        };
        let file_id = document
            .google_drive_file_id
            .as_deref()
            .ok_or_else(|| DocumentError::DriveUpdate(format!("document {} has no Drive file", document.id)))?;
        drive
            .move_to_folder(file_id, folder)
            .await
            .map_err(|e| DocumentError::DriveUpdate(e.to_string()))?;

        let status = request.action.status();
        let rejection_reason = match request.action {
            ReviewAction::Reject => request.reason.clone(),
            ReviewAction::Verify => None,
        };
        let updated = self
            .store
            .review_document(
                document.id,
                DocumentReview {
                    verification_status: status.to_string(),
                    verified_at: Utc::now(),
                    verified_by: reviewer.admin_id,
                    admin_notes: request.admin_notes.clone(),
                    rejection_reason,
                },
            )
            .await?
            .ok_or_else(|| DocumentError::NotFound("Document not found".to_string()))?;

        self.notify_owner(&updated, &request).await;

        let action_name = match request.action {
            ReviewAction::Verify => "verify",
            ReviewAction::Reject => "reject",
        };
        self.store
            .log_admin_activity(NewAdminActivity {
                admin_id: reviewer.admin_id,
                action: format!("document_{}", action_name),
                target_type: "document".to_string(),
                target_id: Some(document.id.to_string()),
                details: serde_json::json!({
                    "document_type": document.document_type,
                    "file_name": document.file_name,
                    "reason": request.reason,
                    "admin_notes": request.admin_notes,
                }),
                ip_address: reviewer.ip_address,
                user_agent: reviewer.user_agent,
            })
            .await?;

        info!("Document {} {} by {}", document.id, status, reviewer.admin_id);
        Ok(ReviewOutcome {
            document: updated,
            action: request.action,
            message: format!("Document {} successfully", status),
        })
    }

    async fn notify_owner(&self, document: &Document, request: &ReviewRequest) {
        let profile = match self.store.get_profile(document.user_id).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Could not load owner of document {}: {}", document.id, e);
                return;
            }
        };
        let Some(profile) = profile else { return };

        let template = match request.action {
            ReviewAction::Verify => "document_verified",
            ReviewAction::Reject => "document_rejected",
        };
        let params = HashMap::from([
            (
                "customer_name".to_string(),
                profile.first_name.clone().unwrap_or_else(|| "Customer".to_string()),
            ),
            ("document_type".to_string(), document.document_type.clone()),
            ("file_name".to_string(), document.file_name.clone()),
            (
                "reason".to_string(),
                request.reason.clone().unwrap_or_else(|| "Not specified".to_string()),
            ),
        ]);
        self.whatsapp
            .notify(
                profile.phone_number.as_deref(),
                template,
                params,
                MessageContext {
                    customer_id: Some(profile.id),
                    loan_id: None,
                },
            )
            .await;
    }

    /// Admin review queue, newest upload first
    pub async fn list_for_review(
        &self,
        status: Option<VerificationStatus>,
        document_type: Option<DocumentType>,
        page: i64,
        limit: i64,
    ) -> Result<(Vec<Document>, Pagination), DocumentError> {
        let mut filter = DocumentFilter {
            verification_status: status.map(|s| s.to_string()),
            document_types: document_type.map(|t| vec![t.to_string()]),
            ..Default::default()
        };
        let total = self.store.count_documents(&filter).await?;

        filter.limit = Some(limit);
        filter.offset = Some(Pagination::offset(page, limit));
        let documents = self.store.list_documents(&filter).await?;
        Ok((documents, Pagination::new(page, limit, total)))
    }

    /// Counts, distributions, daily upload trend and size figures over the matching documents
    pub async fn analytics(&self, query: AnalyticsQuery) -> Result<DocumentAnalytics, DocumentError> {
        if let (Some(start), Some(end)) = (query.start, query.end) {
            if end < start {
                return Err(DocumentError::Invalid("End date must be after start date".to_string()));
            }
        }
        let filter = DocumentFilter {
            user_id: query.user_id,
            verification_status: query.verification_status.map(|s| s.to_string()),
            document_types: query.document_type.map(|t| vec![t.to_string()]),
            uploaded_from: query.start,
            uploaded_to: query.end,
            ..Default::default()
        };
        let documents = self.store.list_documents(&filter).await?;
        Ok(DocumentAnalytics::from_documents(&documents))
    }

    /// Admin actions taken on documents, newest first
    pub async fn audit_trail(&self, query: AuditQuery) -> Result<AuditTrail, DocumentError> {
        if !(1..=1000).contains(&query.limit) || query.offset < 0 {
            return Err(DocumentError::Invalid("Invalid pagination parameters".to_string()));
        }
        let mut filter = ActivityFilter {
            admin_id: query.admin_id,
            target_type: Some("document".to_string()),
            target_id: query.document_id.map(|id| id.to_string()),
            action: query.action,
            from: query.start,
            to: query.end,
            ..Default::default()
        };
        let total = self.store.count_admin_activities(&filter).await?;

        let statistics = if query.include_stats {
            let everything = self.store.list_admin_activities(&filter).await?;
            Some(audit_statistics(&everything))
        } else {
            None
        };

        filter.limit = Some(query.limit);
        filter.offset = Some(query.offset);
        let audit_trail = self.store.list_admin_activities(&filter).await?;
        Ok(AuditTrail {
            audit_trail,
            total,
            limit: query.limit,
            offset: query.offset,
            statistics,
        })
    }

    /// Authenticated round trip to Drive; a failed call is reported, not raised
    pub async fn drive_status(&self) -> Result<DriveStatus, DocumentError> {
        let drive = self.drive()?;
        Ok(match drive.test_connection().await {
            Ok(about) => DriveStatus {
                connected: true,
                account: about.get("user").cloned(),
                error: None,
            },
            Err(e) => {
                warn!("Drive connection check failed: {}", e);
                DriveStatus {
                    connected: false,
                    account: None,
                    error: Some(e.to_string()),
                }
            }
        })
    }
}

fn audit_statistics(activities: &[AdminActivity]) -> AuditStatistics {
    let mut action_types = BTreeMap::new();
    let mut user_activity = BTreeMap::new();
    for activity in activities {
        *action_types.entry(activity.action.clone()).or_insert(0) += 1;
        *user_activity.entry(activity.admin_id.to_string()).or_insert(0) += 1;
    }
    AuditStatistics {
        total_actions: activities.len() as i64,
        action_types,
        user_activity,
        date_range: AuditDateRange {
            earliest: activities.iter().map(|a| a.created_at).min(),
            latest: activities.iter().map(|a| a.created_at).max(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::database::models::Profile;
    use crate::database::{DocumentStore, MemoryStore, ProfileStore};
    use crate::testing::{FakeDrive, RecordingSender};

    struct Fixture {
        store: Arc<MemoryStore>,
        drive: Arc<FakeDrive>,
        sender: Arc<RecordingSender>,
        service: DocumentService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let drive = Arc::new(FakeDrive::default());
        let sender = Arc::new(RecordingSender::default());
        let config = AppConfig::for_tests();
        let service = DocumentService::new(
            store.clone(),
            Some(drive.clone()),
            Arc::new(config.google_drive),
            WhatsAppService::new(store.clone(), Some(sender.clone())),
            config.whatsapp.admin_number,
        );
        Fixture {
            store,
            drive,
            sender,
            service,
        }
    }

    fn upload_request(user_id: Uuid, file_name: &str) -> UploadRequest {
        UploadRequest {
            user_id,
            loan_application_id: None,
            declared_type: None,
            file_name: file_name.to_string(),
            mime_type: "application/pdf".to_string(),
            content: b"%PDF-1.4 test".to_vec(),
        }
    }

    #[tokio::test]
    async fn upload_classifies_routes_and_notifies_admin() {
        let f = fixture();
        let user_id = Uuid::new_v4();

        let uploaded = f.service.upload(upload_request(user_id, "March payslip.pdf")).await.unwrap();
        assert_eq!(uploaded.document_type, "payslip");
        assert_eq!(uploaded.verification_status, "pending");
        assert_eq!(f.drive.folder_of(&uploaded.file_id).await.as_deref(), Some("folder-payslips"));

        let stored = f.store.get_document(uploaded.id).await.unwrap().unwrap();
        assert_eq!(stored.file_size, 13);
        assert_eq!(stored.checksum.as_deref().map(str::len), Some(64));

        let sent = f.sender.sent().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "+264811111111");
        assert!(sent[0].1.contains("March payslip.pdf"));
    }

    #[tokio::test]
    async fn declared_type_fills_in_for_unrecognised_names() {
        let f = fixture();
        let mut request = upload_request(Uuid::new_v4(), "scan_0001.pdf");
        request.declared_type = Some(DocumentType::Passport);
        let uploaded = f.service.upload(request).await.unwrap();
        assert_eq!(uploaded.document_type, "passport");

        let uploaded = f.service.upload(upload_request(Uuid::new_v4(), "scan_0002.pdf")).await.unwrap();
        assert_eq!(uploaded.document_type, "other");
        assert_eq!(f.drive.folder_of(&uploaded.file_id).await.as_deref(), Some("folder-pending"));
    }

    #[tokio::test]
    async fn rejects_bad_files() {
        let f = fixture();
        let mut request = upload_request(Uuid::new_v4(), "id.exe");
        request.mime_type = "application/x-msdownload".into();
        let err = f.service.upload(request).await.unwrap_err();
        assert_eq!(err.to_string(), "File type not supported");

        let mut request = upload_request(Uuid::new_v4(), "big.pdf");
        request.content = vec![0; 10 * 1024 * 1024 + 1];
        let err = f.service.upload(request).await.unwrap_err();
        assert_eq!(err.to_string(), "File size exceeds 10MB limit");

        let request = upload_request(Uuid::new_v4(), "payslip.pdf.js");
        let err = f.service.upload(request).await.unwrap_err();
        assert_eq!(err.to_string(), "File type not allowed for security reasons");
    }

    #[tokio::test]
    async fn upload_without_drive_is_unavailable() {
        let store = Arc::new(MemoryStore::new());
        let config = AppConfig::for_tests();
        let service = DocumentService::new(
            store.clone(),
            None,
            Arc::new(config.google_drive),
            WhatsAppService::new(store, None),
            None,
        );
        let err = service.upload(upload_request(Uuid::new_v4(), "payslip.pdf")).await.unwrap_err();
        assert!(matches!(err, DocumentError::StorageUnavailable));
    }

    #[tokio::test]
    async fn drive_failure_is_an_upload_error() {
        let f = fixture();
        f.drive.fail_uploads();
        let err = f.service.upload(upload_request(Uuid::new_v4(), "payslip.pdf")).await.unwrap_err();
        assert!(matches!(err, DocumentError::Upload(_)));
    }

    #[tokio::test]
    async fn sync_counts_missing_files() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        let kept = f.service.upload(upload_request(user_id, "payslip.pdf")).await.unwrap();
        let gone = f.service.upload(upload_request(user_id, "passport.pdf")).await.unwrap();
        f.drive.remove(&gone.file_id).await;

        let report = f.service.sync(user_id, SyncType::Full, None, None).await.unwrap();
        assert_eq!(report.documents_synced, 1);
        assert_eq!(report.partial_success, Some(true));
        assert_eq!(report.failed_documents, Some(vec!["passport.pdf".to_string()]));
        assert_eq!(report.sync_summary.as_ref().map(|s| s.errors), Some(1));

        let sync_id = report.sync_id.unwrap();
        let record = f.service.get_sync(sync_id, Some(user_id)).await.unwrap();
        assert_eq!(record.status, "partial");
        assert!(f.service.get_sync(sync_id, Some(Uuid::new_v4())).await.is_err());

        let filtered = f
            .service
            .sync(user_id, SyncType::Partial, Some(vec!["payslip".into()]), None)
            .await
            .unwrap();
        assert_eq!(filtered.documents_synced, 1);
        assert_eq!(filtered.partial_success, None);
        assert!(kept.file_id.starts_with("drive-"));
    }

    #[tokio::test]
    async fn sync_with_no_documents() {
        let f = fixture();
        let report = f.service.sync(Uuid::new_v4(), SyncType::Incremental, None, None).await.unwrap();
        assert_eq!(report.documents_synced, 0);
        assert!(report.sync_id.is_none());
        assert_eq!(report.message.as_deref(), Some("No documents found to sync"));
    }

    #[tokio::test]
    async fn review_moves_file_updates_row_and_logs() {
        let f = fixture();
        let owner = Uuid::new_v4();
        let mut profile = Profile::new(owner, "owner@example.com", "user");
        profile.first_name = Some("Selma".into());
        profile.phone_number = Some("0812223333".into());
        f.store.create_profile(profile).await.unwrap();

        let uploaded = f.service.upload(upload_request(owner, "national id.pdf")).await.unwrap();
        let admin_id = Uuid::new_v4();
        let outcome = f
            .service
            .review(
                ReviewRequest {
                    document_id: uploaded.id,
                    action: ReviewAction::Reject,
                    reason: Some("Blurry".into()),
                    admin_notes: Some("Ask for a rescan".into()),
                },
                Reviewer {
                    admin_id,
                    ip_address: Some("10.0.0.1".into()),
                    user_agent: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(outcome.message, "Document rejected successfully");
        assert_eq!(outcome.document.verification_status, "rejected");
        assert_eq!(outcome.document.rejection_reason.as_deref(), Some("Blurry"));
        assert_eq!(outcome.document.verified_by, Some(admin_id));
        assert_eq!(f.drive.folder_of(&uploaded.file_id).await.as_deref(), Some("folder-rejected"));

        let activities = f.store.admin_activities().await;
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].action, "document_reject");

        let sent = f.sender.sent().await;
        let owner_message = sent.iter().find(|(to, _)| to == "+264812223333").unwrap();
        assert!(owner_message.1.contains("Reason: Blurry"));
    }

    #[tokio::test]
    async fn review_of_unknown_document() {
        let f = fixture();
        let err = f
            .service
            .review(
                ReviewRequest {
                    document_id: Uuid::new_v4(),
                    action: ReviewAction::Verify,
                    reason: None,
                    admin_notes: None,
                },
                Reviewer {
                    admin_id: Uuid::new_v4(),
                    ip_address: None,
                    user_agent: None,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Document not found");
    }

    #[tokio::test]
    async fn review_queue_paginates() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        for name in ["payslip-1.pdf", "payslip-2.pdf", "passport.pdf"] {
            f.service.upload(upload_request(user_id, name)).await.unwrap();
        }

        let (page, pagination) = f
            .service
            .list_for_review(Some(VerificationStatus::Pending), Some(DocumentType::Payslip), 1, 1)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(pagination.total, 2);
        assert_eq!(pagination.total_pages, 2);
    }

    #[tokio::test]
    async fn failed_insert_removes_the_drive_upload() {
        let f = fixture();
        f.store.fail_document_inserts();
        let err = f.service.upload(upload_request(Uuid::new_v4(), "payslip.pdf")).await.unwrap_err();
        assert!(matches!(err, DocumentError::Database(_)));
        assert_eq!(f.drive.file_count().await, 0);
        assert!(f.sender.sent().await.is_empty());
    }

    #[tokio::test]
    async fn analytics_summarises_matching_documents() {
        let f = fixture();
        let user_id = Uuid::new_v4();
        for name in ["payslip-1.pdf", "payslip-2.pdf", "passport.pdf"] {
            f.service.upload(upload_request(user_id, name)).await.unwrap();
        }
        let mut bigger = upload_request(user_id, "bank statement.pdf");
        bigger.content = vec![1; 100];
        f.service.upload(bigger).await.unwrap();
        f.service.upload(upload_request(Uuid::new_v4(), "payslip.pdf")).await.unwrap();

        let analytics = f
            .service
            .analytics(AnalyticsQuery {
                user_id: Some(user_id),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(analytics.total_documents, 4);
        assert_eq!(analytics.pending_documents, 4);
        assert_eq!(analytics.verified_documents, 0);
        assert_eq!(analytics.document_types.get("payslip"), Some(&2));
        assert_eq!(analytics.verification_status_distribution.get("pending"), Some(&4));
        assert_eq!(analytics.upload_trends.len(), 1);
        assert_eq!(analytics.upload_trends[0].count, 4);
        assert_eq!(
            analytics.file_size_stats,
            FileSizeStats {
                total_size: 139,
                average_size: 35,
                largest_file: 100,
                smallest_file: 13,
            }
        );

        let payslips = f
            .service
            .analytics(AnalyticsQuery {
                user_id: Some(user_id),
                document_type: Some(DocumentType::Payslip),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(payslips.total_documents, 2);
    }

    #[tokio::test]
    async fn analytics_of_nothing_is_all_zero() {
        let f = fixture();
        let analytics = f
            .service
            .analytics(AnalyticsQuery {
                user_id: Some(Uuid::new_v4()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(analytics.total_documents, 0);
        assert!(analytics.upload_trends.is_empty());
        assert_eq!(analytics.file_size_stats, FileSizeStats::default());

        let now = Utc::now();
        let err = f
            .service
            .analytics(AnalyticsQuery {
                start: Some(now),
                end: Some(now - chrono::Duration::days(1)),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "End date must be after start date");
    }

    #[tokio::test]
    async fn audit_trail_lists_document_actions_with_stats() {
        let f = fixture();
        let admin_id = Uuid::new_v4();
        let uploaded = f.service.upload(upload_request(Uuid::new_v4(), "passport.pdf")).await.unwrap();
        let other = f.service.upload(upload_request(Uuid::new_v4(), "payslip.pdf")).await.unwrap();
        for (document_id, action) in [(uploaded.id, ReviewAction::Reject), (other.id, ReviewAction::Verify)] {
            f.service
                .review(
                    ReviewRequest {
                        document_id,
                        action,
                        reason: None,
                        admin_notes: None,
                    },
                    Reviewer {
                        admin_id,
                        ip_address: None,
                        user_agent: None,
                    },
                )
                .await
                .unwrap();
        }
        f.store
            .log_admin_activity(NewAdminActivity {
                admin_id,
                action: "application_approve".to_string(),
                target_type: "loan_application".to_string(),
                target_id: None,
                details: serde_json::Value::Null,
                ip_address: None,
                user_agent: None,
            })
            .await
            .unwrap();

        let trail = f
            .service
            .audit_trail(AuditQuery {
                limit: 1,
                include_stats: true,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(trail.total, 2);
        assert_eq!(trail.audit_trail.len(), 1);
        let stats = trail.statistics.unwrap();
        assert_eq!(stats.total_actions, 2);
        assert_eq!(stats.action_types.get("document_reject"), Some(&1));
        assert_eq!(stats.user_activity.get(&admin_id.to_string()), Some(&2));
        assert!(stats.date_range.earliest <= stats.date_range.latest);

        let one = f
            .service
            .audit_trail(AuditQuery {
                document_id: Some(uploaded.id),
                limit: 50,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(one.total, 1);
        assert_eq!(one.audit_trail[0].action, "document_reject");
        assert!(one.statistics.is_none());

        for (limit, offset) in [(0, 0), (1001, 0), (10, -1)] {
            let err = f
                .service
                .audit_trail(AuditQuery {
                    limit,
                    offset,
                    ..Default::default()
                })
                .await
                .unwrap_err();
            assert_eq!(err.to_string(), "Invalid pagination parameters");
        }
    }

    #[tokio::test]
    async fn drive_status_reports_connection() {
        let f = fixture();
        let status = f.service.drive_status().await.unwrap();
        assert!(status.connected);
        assert_eq!(
            status.account.as_ref().and_then(|a| a["emailAddress"].as_str()),
            Some("fake-drive@example.com")
        );

        f.drive.go_offline();
        let status = f.service.drive_status().await.unwrap();
        assert!(!status.connected);
        assert_eq!(status.error.as_deref(), Some("Drive API error (401): invalid_grant"));
    }
}
