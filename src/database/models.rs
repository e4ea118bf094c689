//! Row types for every table in `migrations/0001_initial.sql`.
//!
//! Status columns stay `String`; `crate::types` holds the validated enums.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub email: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub role: String,
    pub permissions: Vec<String>,
    pub monthly_income: Option<Decimal>,
    pub company_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl Profile {
    pub fn new(id: Uuid, email: impl Into<String>, role: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            first_name: None,
            last_name: None,
            phone_number: None,
            role: role.into(),
            permissions: Vec::new(),
            monthly_income: None,
            company_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{} {}", first, last),
            (Some(first), None) => first.clone(),
            _ => self.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PartnerCompany {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LoanApplication {
    pub id: Uuid,
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub loan_amount: Decimal,
    pub loan_term: i32,
    pub loan_purpose: Option<String>,
    pub monthly_income: Option<Decimal>,
    pub monthly_expenses: Option<Decimal>,
    pub status: String,
    pub application_date: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewLoanApplication {
    pub user_id: Uuid,
    pub company_id: Option<Uuid>,
    pub loan_amount: Decimal,
    pub loan_term: i32,
    pub loan_purpose: Option<String>,
    pub monthly_income: Option<Decimal>,
    pub monthly_expenses: Option<Decimal>,
    pub status: String,
}

/// Listing filter for loan applications; `None` fields do not constrain.
#[derive(Debug, Clone, Default)]
pub struct ApplicationFilter {
    pub user_id: Option<Uuid>,
    pub company_id: Option<Uuid>,
    pub status: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub application_id: Option<Uuid>,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub term_months: i32,
    pub interest_rate: Decimal,
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
    pub principal_balance: Decimal,
    pub remaining_balance: Decimal,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLoan {
    pub application_id: Option<Uuid>,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub term_months: i32,
    pub interest_rate: Decimal,
    pub monthly_payment: Decimal,
    pub total_amount: Decimal,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoanUpdate {
    pub status: Option<String>,
    pub remaining_balance: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPayment {
    pub loan_id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub user_id: Uuid,
    pub loan_application_id: Option<Uuid>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub checksum: Option<String>,
    pub google_drive_file_id: Option<String>,
    pub google_drive_url: Option<String>,
    pub document_type: String,
    pub verification_status: String,
    pub verified_at: Option<DateTime<Utc>>,
    pub verified_by: Option<Uuid>,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDocument {
    pub user_id: Uuid,
    pub loan_application_id: Option<Uuid>,
    pub file_name: String,
    pub file_type: String,
    pub file_size: i64,
    pub checksum: Option<String>,
    pub google_drive_file_id: Option<String>,
    pub google_drive_url: Option<String>,
    pub document_type: String,
    pub verification_status: String,
}

/// Outcome of an admin review.
#[derive(Debug, Clone)]
pub struct DocumentReview {
    pub verification_status: String,
    pub verified_at: DateTime<Utc>,
    pub verified_by: Uuid,
    pub admin_notes: Option<String>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DocumentFilter {
    pub user_id: Option<Uuid>,
    pub loan_application_id: Option<Uuid>,
    pub verification_status: Option<String>,
    pub document_types: Option<Vec<String>>,
    pub uploaded_from: Option<DateTime<Utc>>,
    pub uploaded_to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentSync {
    pub sync_id: Uuid,
    pub user_id: Uuid,
    pub sync_type: String,
    pub status: String,
    pub documents_synced: i32,
    pub failed_documents: Vec<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AdminActivity {
    pub id: Uuid,
    pub admin_id: Uuid,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewAdminActivity {
    pub admin_id: Uuid,
    pub action: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub details: Value,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ActivityFilter {
    pub admin_id: Option<Uuid>,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CustomerRelationship {
    pub customer_id: Uuid,
    pub relationship_stage: String,
    pub relationship_score: i32,
    pub communication_preferences: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct JourneyStage {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub stage: String,
    pub stage_entry_date: DateTime<Utc>,
    pub stage_exit_date: Option<DateTime<Utc>>,
    pub time_in_stage_hours: Option<i64>,
    pub stage_metrics: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Communication {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub channel: String,
    pub direction: String,
    pub message_type: String,
    pub subject: Option<String>,
    pub message_content: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewCommunication {
    pub customer_id: Uuid,
    pub channel: String,
    pub direction: String,
    pub message_type: String,
    pub subject: Option<String>,
    pub message_content: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Lead {
    pub customer_id: Uuid,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct HealthScoreRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub health_score: i32,
    pub score_components: Value,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PartnerPerformance {
    pub id: Uuid,
    pub partner_id: Uuid,
    pub metric_period_start: DateTime<Utc>,
    pub metric_period_end: DateTime<Utc>,
    pub application_volume: i64,
    pub active_borrowers: i64,
    pub approval_rate: Decimal,
    pub total_loan_volume: Decimal,
    pub average_loan_amount: Decimal,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Task {
    pub id: Uuid,
    pub project_id: Option<Uuid>,
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub project_id: Option<Uuid>,
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    /// Empty means `todo`
    #[serde(default)]
    pub status: String,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub assignee_id: Option<Uuid>,
    pub status: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub project_id: Option<Uuid>,
    pub assignee_id: Option<Uuid>,
    pub customer_id: Option<Uuid>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// WhatsApp message keyed by the provider's message sid.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WhatsAppMessage {
    pub id: String,
    pub customer_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
    pub phone_number: String,
    pub direction: String,
    pub message_type: String,
    pub template_name: Option<String>,
    pub content: String,
    pub status: String,
    pub sent_at: DateTime<Utc>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RefreshTokenRecord {
    pub jti: Uuid,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
}
