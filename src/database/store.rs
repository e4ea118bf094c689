//! Persistence seams used by the services.
//!
//! Each table group has its own trait; `Store` bundles them so handlers can
//! hold a single `Arc<dyn Store>` backed by either Postgres or memory.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::manager::DatabaseError;
use super::models::*;

pub type StoreResult<T> = Result<T, DatabaseError>;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>>;
    async fn create_profile(&self, profile: Profile) -> StoreResult<Profile>;
}

#[async_trait]
pub trait LoanStore: Send + Sync {
    /// Active partner companies ordered by name
    async fn list_partner_companies(&self) -> StoreResult<Vec<PartnerCompany>>;
    /// Active companies whose name or code contains `query`, case-insensitive
    async fn search_partner_companies(&self, query: &str, limit: i64) -> StoreResult<Vec<PartnerCompany>>;

    async fn create_application(&self, application: NewLoanApplication) -> StoreResult<LoanApplication>;
    /// Newest first
    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<LoanApplication>>;
    async fn count_applications(&self, filter: &ApplicationFilter) -> StoreResult<i64>;
    async fn get_application(&self, id: Uuid) -> StoreResult<Option<LoanApplication>>;
    async fn update_application_status(&self, id: Uuid, status: &str) -> StoreResult<Option<LoanApplication>>;

    async fn create_loan(&self, loan: NewLoan) -> StoreResult<Loan>;
    /// Newest first
    async fn list_loans(&self, user_id: Uuid) -> StoreResult<Vec<Loan>>;
    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>>;
    async fn list_loans_by_status(&self, status: &str) -> StoreResult<Vec<Loan>>;
    async fn update_loan(&self, id: Uuid, update: LoanUpdate) -> StoreResult<Option<Loan>>;
    /// Sum of monthly payments over the user's active loans
    async fn active_monthly_obligations(&self, user_id: Uuid) -> StoreResult<Decimal>;

    async fn create_payment(&self, payment: NewPayment) -> StoreResult<Payment>;
    /// Ordered by due date
    async fn list_user_payments(&self, user_id: Uuid) -> StoreResult<Vec<Payment>>;
    async fn list_loan_payments(&self, loan_id: Uuid) -> StoreResult<Vec<Payment>>;
    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>>;
    /// Payments in `status` due in `[start, end)`, ordered by due date
    async fn payments_due_between(
        &self,
        status: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Payment>>;
    async fn update_payment_status(
        &self,
        id: Uuid,
        status: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Payment>>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert_document(&self, document: NewDocument) -> StoreResult<Document>;
    async fn get_document(&self, id: Uuid) -> StoreResult<Option<Document>>;
    /// Newest upload first
    async fn list_documents(&self, filter: &DocumentFilter) -> StoreResult<Vec<Document>>;
    async fn count_documents(&self, filter: &DocumentFilter) -> StoreResult<i64>;
    async fn review_document(&self, id: Uuid, review: DocumentReview) -> StoreResult<Option<Document>>;

    async fn insert_sync(&self, sync: DocumentSync) -> StoreResult<DocumentSync>;
    async fn get_sync(&self, sync_id: Uuid) -> StoreResult<Option<DocumentSync>>;
    /// Newest first
    async fn list_syncs(&self, user_id: Uuid) -> StoreResult<Vec<DocumentSync>>;

    async fn log_admin_activity(&self, activity: NewAdminActivity) -> StoreResult<AdminActivity>;
    /// Newest first
    async fn list_admin_activities(&self, filter: &ActivityFilter) -> StoreResult<Vec<AdminActivity>>;
    async fn count_admin_activities(&self, filter: &ActivityFilter) -> StoreResult<i64>;
}

#[async_trait]
pub trait CrmStore: Send + Sync {
    /// The journey row with no exit date, if any
    async fn open_journey_stage(&self, customer_id: Uuid) -> StoreResult<Option<JourneyStage>>;
    async fn close_journey_stage(
        &self,
        id: Uuid,
        exit_date: DateTime<Utc>,
        time_in_stage_hours: Option<i64>,
    ) -> StoreResult<()>;
    async fn insert_journey_stage(
        &self,
        customer_id: Uuid,
        stage: &str,
        metrics: serde_json::Value,
    ) -> StoreResult<JourneyStage>;
    /// Oldest first
    async fn list_journey(&self, customer_id: Uuid) -> StoreResult<Vec<JourneyStage>>;

    async fn get_relationship(&self, customer_id: Uuid) -> StoreResult<Option<CustomerRelationship>>;
    async fn upsert_relationship(&self, relationship: CustomerRelationship) -> StoreResult<CustomerRelationship>;

    async fn insert_communication(&self, communication: NewCommunication) -> StoreResult<Communication>;
    /// Newest first
    async fn recent_communications(&self, limit: i64) -> StoreResult<Vec<Communication>>;
    async fn customer_communications(&self, customer_id: Uuid) -> StoreResult<Vec<Communication>>;

    async fn get_lead(&self, customer_id: Uuid) -> StoreResult<Option<Lead>>;
    /// Updates an existing lead only; returns `None` when the customer has none
    async fn update_lead_status(&self, customer_id: Uuid, status: &str) -> StoreResult<Option<Lead>>;

    async fn insert_health_score(&self, record: HealthScoreRecord) -> StoreResult<HealthScoreRecord>;
    async fn insert_partner_performance(&self, metrics: PartnerPerformance) -> StoreResult<PartnerPerformance>;

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>>;
    async fn create_task(&self, task: NewTask) -> StoreResult<Task>;
    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> StoreResult<Option<Task>>;

    async fn list_projects(&self) -> StoreResult<Vec<Project>>;
    async fn create_project(&self, name: &str, description: Option<&str>) -> StoreResult<Project>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn insert_message(&self, message: WhatsAppMessage) -> StoreResult<WhatsAppMessage>;
    /// Stamps `delivered_at` / `read_at` when the status calls for it
    async fn update_message_status(
        &self,
        id: &str,
        status: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<WhatsAppMessage>>;
    /// Newest first
    async fn customer_messages(&self, customer_id: Uuid) -> StoreResult<Vec<WhatsAppMessage>>;
    async fn messages_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<WhatsAppMessage>>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn record_refresh_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()>;
    async fn get_refresh_token(&self, jti: Uuid) -> StoreResult<Option<RefreshTokenRecord>>;
    async fn revoke_refresh_token(&self, jti: Uuid) -> StoreResult<bool>;
    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64>;

    async fn blacklist_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()>;
    async fn is_blacklisted(&self, jti: Uuid) -> StoreResult<bool>;

    /// Deletes blacklist and refresh rows that expired before `now`
    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Everything the service needs from persistence.
#[async_trait]
pub trait Store: ProfileStore + LoanStore + DocumentStore + CrmStore + MessageStore + TokenStore {
    /// Connectivity check used by `/health`
    async fn ping(&self) -> StoreResult<()>;

    fn backend_name(&self) -> &'static str;
}
