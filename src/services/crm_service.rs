//! CRM bookkeeping driven by loan activity.
//!
//! Application status changes fan out into the journey, relationship,
//! communication and lead tables through fixed lookup tables. Health scores
//! and partner metrics are computed here from the loan and messaging rows.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::database::models::{
    ApplicationFilter, Communication, CustomerRelationship, DocumentFilter, HealthScoreRecord, NewCommunication,
    NewTask, PartnerPerformance, Project, Task, TaskFilter, TaskUpdate,
};
use crate::database::{DatabaseError, Store};
use crate::types::{LoanStatus, PaymentStatus, TaskStatus, VerificationStatus};

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Journey stage entered for an application status
pub fn journey_stage(status: &str) -> Option<&'static str> {
    match status {
        "draft" => Some("interest"),
        "submitted" => Some("application"),
        "under_review" => Some("kyc"),
        "approved" => Some("approval"),
        "funded" => Some("disbursement"),
        "active" => Some("active_loan"),
        "completed" | "rejected" => Some("completion"),
        _ => None,
    }
}

pub fn relationship_stage(status: &str) -> Option<&'static str> {
    match status {
        "draft" | "rejected" => Some("prospect"),
        "submitted" | "under_review" => Some("applicant"),
        "approved" | "funded" | "active" | "completed" => Some("customer"),
        _ => None,
    }
}

pub fn lead_status(status: &str) -> Option<&'static str> {
    match status {
        "submitted" => Some("qualified"),
        "approved" => Some("converted"),
        "rejected" => Some("unqualified"),
        _ => None,
    }
}

pub fn initial_relationship_score(status: &str) -> i32 {
    match status {
        "draft" => 20,
        "submitted" => 40,
        "under_review" => 50,
        "approved" => 80,
        "funded" => 90,
        "active" => 85,
        "completed" => 95,
        "rejected" => 10,
        _ => 0,
    }
}

/// Dashboard notice (subject, content) for an application status
pub fn status_message(status: &str) -> Option<(&'static str, &'static str)> {
    match status {
        "submitted" => Some((
            "Application Received",
            "Thank you for submitting your loan application. We are now reviewing your documents.",
        )),
        "under_review" => Some((
            "Application Under Review",
            "Your application is now under review. We will notify you of the decision soon.",
        )),
        "approved" => Some((
            "Application Approved!",
            "Congratulations! Your loan application has been approved. Funds will be disbursed shortly.",
        )),
        "rejected" => Some((
            "Application Update",
            "We have reviewed your application. Unfortunately, we cannot approve it at this time.",
        )),
        "funded" => Some((
            "Funds Disbursed",
            "Your loan has been disbursed successfully. Check your account for the funds.",
        )),
        _ => None,
    }
}

fn default_preferences() -> Value {
    json!({ "email": true, "whatsapp": true, "sms": false })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanStatusSync {
    pub application_id: Uuid,
    pub user_id: Uuid,
    #[serde(default)]
    pub old_status: Option<String>,
    pub new_status: String,
    #[serde(default)]
    pub additional_data: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    pub user_id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartnerPeriod {
    pub partner_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
}

/// Weighted inputs of a health score, each on a 0..=100 scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct HealthComponents {
    pub payment_history: i32,
    pub loan_standing: i32,
    pub engagement: i32,
    pub kyc: i32,
}

impl HealthComponents {
    pub fn score(&self) -> i32 {
        let weighted = self.payment_history * 40 + self.loan_standing * 30 + self.engagement * 20 + self.kyc * 10;
        (weighted as f64 / 100.0).round() as i32
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecentActivity {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub activity_type: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    pub customer_id: Uuid,
    pub customer_name: String,
}

/// Title of the task raised for an application stuck in `submitted`
pub const FOLLOW_UP_TITLE: &str = "KYC review follow-up";

const SURVEY_MESSAGE: &str =
    "Thank you for repaying your Buffr Lend loan. Tell us about your experience so we can serve you better.";

/// Counts from one daily automation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutomationReport {
    pub overdue_applications: usize,
    pub follow_up_tasks: usize,
    pub payment_reminders: usize,
    pub satisfaction_surveys: usize,
}

pub struct CrmService {
    store: Arc<dyn Store>,
}

impl CrmService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Dispatches a `POST /api/crm/sync` action
    pub async fn run_sync(&self, action: &str, data: Value) -> Result<Value, CrmError> {
        fn parse<T: serde::de::DeserializeOwned>(data: Value) -> Result<T, CrmError> {
            serde_json::from_value(data).map_err(|e| CrmError::Invalid(format!("Invalid sync data: {}", e)))
        }

        match action {
            "sync_loan_status" => {
                let sync: LoanStatusSync = parse(data)?;
                self.sync_loan_application_status(
                    sync.application_id,
                    sync.user_id,
                    sync.old_status.as_deref().unwrap_or(""),
                    &sync.new_status,
                    sync.additional_data.unwrap_or(Value::Null),
                )
                .await?;
                Ok(json!({ "applicationId": sync.application_id, "status": sync.new_status }))
            }
            "sync_new_customer" => {
                let customer: CustomerRef = parse(data)?;
                self.sync_new_customer(customer.user_id).await?;
                Ok(json!({ "userId": customer.user_id }))
            }
            "update_health_score" => {
                let customer: CustomerRef = parse(data)?;
                let record = self.update_customer_health_score(customer.user_id).await?;
                Ok(json!(record))
            }
            "sync_partner_performance" => {
                let period: PartnerPeriod = parse(data)?;
                let metrics = self
                    .sync_partner_performance(period.partner_id, period.start_date, period.end_date)
                    .await?;
                Ok(json!(metrics))
            }
            _ => Err(CrmError::Invalid("Invalid action".to_string())),
        }
    }

    /// Mirrors an application status change into the CRM tables. Statuses a
    /// table has no mapping for leave that table untouched.
    pub async fn sync_loan_application_status(
        &self,
        application_id: Uuid,
        user_id: Uuid,
        old_status: &str,
        new_status: &str,
        additional_data: Value,
    ) -> Result<(), CrmError> {
        let mut metrics = match additional_data {
            Value::Object(map) => Value::Object(map),
            _ => json!({}),
        };
        if let Some(map) = metrics.as_object_mut() {
            map.entry("application_id").or_insert(json!(application_id));
        }

        self.advance_journey(user_id, new_status, metrics).await?;
        self.update_relationship(user_id, new_status).await?;
        self.record_status_communication(user_id, new_status).await?;
        if let Some(status) = lead_status(new_status) {
            if self.store.update_lead_status(user_id, status).await?.is_none() {
                debug!("No lead for {}, skipping lead status {}", user_id, status);
            }
        }

        info!(
            "CRM synced application {} ({} -> {}) for {}",
            application_id, old_status, new_status, user_id
        );
        Ok(())
    }

    async fn advance_journey(&self, user_id: Uuid, status: &str, metrics: Value) -> Result<(), CrmError> {
        let Some(stage) = journey_stage(status) else {
            return Ok(());
        };

        let now = Utc::now();
        if let Some(open) = self.store.open_journey_stage(user_id).await? {
            if open.stage == stage {
                return Ok(());
            }
            let hours = (now - open.stage_entry_date).num_minutes() as f64 / 60.0;
            self.store
                .close_journey_stage(open.id, now, Some(hours.round() as i64))
                .await?;
        }
        self.store.insert_journey_stage(user_id, stage, metrics).await?;
        Ok(())
    }

    async fn update_relationship(&self, user_id: Uuid, status: &str) -> Result<(), CrmError> {
        let Some(stage) = relationship_stage(status) else {
            return Ok(());
        };

        let now = Utc::now();
        let relationship = match self.store.get_relationship(user_id).await? {
            Some(existing) => CustomerRelationship {
                relationship_stage: stage.to_string(),
                updated_at: now,
                ..existing
            },
            None => CustomerRelationship {
                customer_id: user_id,
                relationship_stage: stage.to_string(),
                relationship_score: initial_relationship_score(status),
                communication_preferences: default_preferences(),
                created_at: now,
                updated_at: now,
            },
        };
        self.store.upsert_relationship(relationship).await?;
        Ok(())
    }

    async fn record_status_communication(&self, user_id: Uuid, status: &str) -> Result<(), CrmError> {
        let Some((subject, content)) = status_message(status) else {
            return Ok(());
        };
        self.store
            .insert_communication(NewCommunication {
                customer_id: user_id,
                channel: "dashboard".to_string(),
                direction: "outbound".to_string(),
                message_type: "application_update".to_string(),
                subject: Some(subject.to_string()),
                message_content: content.to_string(),
                status: "sent".to_string(),
            })
            .await?;
        Ok(())
    }

    /// Prospect relationship, awareness journey stage and a welcome e-mail record.
    /// An existing relationship keeps its stage and score.
    pub async fn sync_new_customer(&self, user_id: Uuid) -> Result<(), CrmError> {
        let now = Utc::now();
        if self.store.get_relationship(user_id).await?.is_none() {
            self.store
                .upsert_relationship(CustomerRelationship {
                    customer_id: user_id,
                    relationship_stage: "prospect".to_string(),
                    relationship_score: 10,
                    communication_preferences: default_preferences(),
                    created_at: now,
                    updated_at: now,
                })
                .await?;
        }

        if self.store.open_journey_stage(user_id).await?.is_none() {
            self.store.insert_journey_stage(user_id, "awareness", json!({})).await?;
        }

        self.store
            .insert_communication(NewCommunication {
                customer_id: user_id,
                channel: "email".to_string(),
                direction: "outbound".to_string(),
                message_type: "welcome".to_string(),
                subject: Some("Welcome to Buffr Lend!".to_string()),
                message_content: "Thank you for joining Buffr Lend. We are here to help with your financial needs."
                    .to_string(),
                status: "sent".to_string(),
            })
            .await?;

        info!("New customer synced to CRM: {}", user_id);
        Ok(())
    }

    pub async fn health_components(&self, user_id: Uuid) -> Result<HealthComponents, CrmError> {
        let now = Utc::now();
        let since = now - Duration::days(30);

        let documents = DocumentFilter {
            user_id: Some(user_id),
            ..Default::default()
        };
        let (payments, loans, communications, messages, documents) = futures::try_join!(
            self.store.list_user_payments(user_id),
            self.store.list_loans(user_id),
            self.store.customer_communications(user_id),
            self.store.customer_messages(user_id),
            self.store.list_documents(&documents),
        )?;

        let paid = payments.iter().filter(|p| p.status == PaymentStatus::Paid.as_str()).count();
        let missed = payments
            .iter()
            .filter(|p| {
                p.status == PaymentStatus::Failed.as_str()
                    || (p.status == PaymentStatus::Pending.as_str() && p.due_date < now)
            })
            .count();
        let payment_history = if paid + missed == 0 {
            100
        } else {
            (paid * 100 / (paid + missed)) as i32
        };

        let defaulted = loans.iter().any(|l| l.status == LoanStatus::Defaulted.as_str());
        let loan_standing = if defaulted { 0 } else { 100 };

        let touches = communications.iter().filter(|c| c.created_at >= since).count()
            + messages.iter().filter(|m| m.sent_at >= since).count();
        let engagement = (touches * 10).min(100) as i32;

        let has_status = |status: VerificationStatus| documents.iter().any(|d| d.verification_status == status.as_str());
        let kyc = if has_status(VerificationStatus::Verified) {
            100
        } else if has_status(VerificationStatus::Pending) {
            50
        } else {
            0
        };

        Ok(HealthComponents {
            payment_history,
            loan_standing,
            engagement,
            kyc,
        })
    }

    /// Recomputes the score, stores it on the relationship and appends a history row
    pub async fn update_customer_health_score(&self, user_id: Uuid) -> Result<HealthScoreRecord, CrmError> {
        let components = self.health_components(user_id).await?;
        let score = components.score();
        let now = Utc::now();

        let relationship = match self.store.get_relationship(user_id).await? {
            Some(existing) => CustomerRelationship {
                relationship_score: score,
                updated_at: now,
                ..existing
            },
            None => CustomerRelationship {
                customer_id: user_id,
                relationship_stage: "prospect".to_string(),
                relationship_score: score,
                communication_preferences: default_preferences(),
                created_at: now,
                updated_at: now,
            },
        };
        self.store.upsert_relationship(relationship).await?;

        let record = self
            .store
            .insert_health_score(HealthScoreRecord {
                id: Uuid::new_v4(),
                customer_id: user_id,
                health_score: score,
                score_components: json!(components),
                calculated_at: now,
            })
            .await?;
        info!("Health score for {} is {}", user_id, score);
        Ok(record)
    }

    /// Application volume, approvals and lending volume for a partner over a period
    pub async fn sync_partner_performance(
        &self,
        partner_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<PartnerPerformance, CrmError> {
        if end < start {
            return Err(CrmError::Invalid("End date must not be before start date".to_string()));
        }

        let filter = ApplicationFilter {
            company_id: Some(partner_id),
            from: Some(start),
            to: Some(end),
            ..Default::default()
        };
        let applications = self.store.list_applications(&filter).await?;

        let approved: Vec<_> = applications
            .iter()
            .filter(|a| matches!(a.status.as_str(), "approved" | "funded" | "active" | "completed"))
            .collect();
        let borrowers: HashSet<Uuid> = approved.iter().map(|a| a.user_id).collect();
        let total_loan_volume: Decimal = approved.iter().map(|a| a.loan_amount).sum();

        let volume = applications.len() as i64;
        let approved_count = approved.len() as i64;
        let approval_rate = if volume == 0 {
            Decimal::ZERO
        } else {
            (Decimal::from(approved_count) * Decimal::ONE_HUNDRED / Decimal::from(volume)).round_dp(2)
        };
        let average_loan_amount = if approved_count == 0 {
            Decimal::ZERO
        } else {
            (total_loan_volume / Decimal::from(approved_count)).round_dp(2)
        };

        let metrics = self
            .store
            .insert_partner_performance(PartnerPerformance {
                id: Uuid::new_v4(),
                partner_id,
                metric_period_start: start,
                metric_period_end: end,
                application_volume: volume,
                active_borrowers: borrowers.len() as i64,
                approval_rate,
                total_loan_volume,
                average_loan_amount,
                created_at: Utc::now(),
            })
            .await?;
        info!("Partner {} performance: {} applications, {}% approved", partner_id, volume, approval_rate);
        Ok(metrics)
    }

    pub async fn recent_activities(&self, limit: i64) -> Result<Vec<RecentActivity>, CrmError> {
        let communications = self.store.recent_communications(limit.clamp(1, 100)).await?;
        let mut activities = Vec::with_capacity(communications.len());
        for communication in communications {
            let customer_name = self
                .store
                .get_profile(communication.customer_id)
                .await?
                .map(|p| p.display_name())
                .unwrap_or_else(|| "System".to_string());
            activities.push(RecentActivity {
                id: communication.id,
                activity_type: "communication".to_string(),
                description: describe(&communication),
                timestamp: communication.created_at,
                customer_id: communication.customer_id,
                customer_name,
            });
        }
        Ok(activities)
    }

    /// The daily pass: follow-up tasks for applications submitted over a day
    /// ago, reminders for payments due tomorrow, and surveys for loans paid
    /// off in the last three days. Safe to re-run; nothing is raised twice.
    pub async fn run_daily_automation(&self, now: DateTime<Utc>) -> Result<AutomationReport, CrmError> {
        let mut report = AutomationReport::default();
        self.follow_up_overdue_applications(now, &mut report).await?;
        self.remind_payments_due_tomorrow(now, &mut report).await?;
        self.survey_completed_loans(now, &mut report).await?;
        info!(
            "Daily CRM automation: {} overdue applications, {} tasks, {} reminders, {} surveys",
            report.overdue_applications, report.follow_up_tasks, report.payment_reminders, report.satisfaction_surveys
        );
        Ok(report)
    }

    async fn follow_up_overdue_applications(
        &self,
        now: DateTime<Utc>,
        report: &mut AutomationReport,
    ) -> Result<(), CrmError> {
        let overdue = self
            .store
            .list_applications(&ApplicationFilter {
                status: Some("submitted".to_string()),
                to: Some(now - Duration::hours(24)),
                ..Default::default()
            })
            .await?;
        report.overdue_applications = overdue.len();

        let mut seen = HashSet::new();
        for application in overdue {
            if !seen.insert(application.user_id) {
                continue;
            }
            let open = self
                .store
                .list_tasks(&TaskFilter {
                    customer_id: Some(application.user_id),
                    ..Default::default()
                })
                .await?
                .into_iter()
                .any(|t| t.title == FOLLOW_UP_TITLE && t.status != TaskStatus::Done.as_str());
            if open {
                continue;
            }
            self.store
                .create_task(NewTask {
                    project_id: None,
                    title: FOLLOW_UP_TITLE.to_string(),
                    description: Some(format!("Application {} has waited over 24 hours for review", application.id)),
                    assignee_id: None,
                    customer_id: Some(application.user_id),
                    status: TaskStatus::Todo.to_string(),
                    due_date: Some(now + Duration::hours(24)),
                })
                .await?;
            report.follow_up_tasks += 1;
        }
        Ok(())
    }

    async fn remind_payments_due_tomorrow(
        &self,
        now: DateTime<Utc>,
        report: &mut AutomationReport,
    ) -> Result<(), CrmError> {
        let today = now.date_naive().and_time(NaiveTime::MIN).and_utc();
        let (start, end) = (today + Duration::days(1), today + Duration::days(2));
        let due = self
            .store
            .payments_due_between(PaymentStatus::Pending.as_str(), start, end)
            .await?;

        for payment in due {
            let already = self
                .store
                .customer_communications(payment.user_id)
                .await?
                .into_iter()
                .any(|c| c.message_type == "payment_reminder" && c.created_at >= today);
            if already {
                debug!("Payment reminder already sent today for {}", payment.id);
                continue;
            }
            self.store
                .insert_communication(NewCommunication {
                    customer_id: payment.user_id,
                    channel: "whatsapp".to_string(),
                    direction: "outbound".to_string(),
                    message_type: "payment_reminder".to_string(),
                    subject: Some("Payment Reminder".to_string()),
                    message_content: format!(
                        "Your payment of N${} is due on {}.",
                        payment.amount.round_dp(2),
                        payment.due_date.format("%Y-%m-%d")
                    ),
                    status: "sent".to_string(),
                })
                .await?;
            report.payment_reminders += 1;
        }
        Ok(())
    }

    async fn survey_completed_loans(&self, now: DateTime<Utc>, report: &mut AutomationReport) -> Result<(), CrmError> {
        let since = now - Duration::days(3);
        for loan in self.store.list_loans_by_status(LoanStatus::Completed.as_str()).await? {
            // A loan completes with its last repayment
            let completed_at = self
                .store
                .list_loan_payments(loan.id)
                .await?
                .into_iter()
                .filter(|p| p.status == PaymentStatus::Paid.as_str())
                .filter_map(|p| p.paid_at)
                .max();
            let Some(completed_at) = completed_at.filter(|at| *at >= since && *at <= now) else {
                continue;
            };

            let surveyed = self
                .store
                .customer_communications(loan.user_id)
                .await?
                .into_iter()
                .any(|c| c.message_type == "satisfaction_survey" && c.created_at >= completed_at);
            if surveyed {
                continue;
            }
            self.store
                .insert_communication(NewCommunication {
                    customer_id: loan.user_id,
                    channel: "email".to_string(),
                    direction: "outbound".to_string(),
                    message_type: "satisfaction_survey".to_string(),
                    subject: Some("How did we do?".to_string()),
                    message_content: SURVEY_MESSAGE.to_string(),
                    status: "sent".to_string(),
                })
                .await?;
            report.satisfaction_surveys += 1;
        }
        Ok(())
    }

    pub async fn list_tasks(&self, filter: &TaskFilter) -> Result<Vec<Task>, CrmError> {
        Ok(self.store.list_tasks(filter).await?)
    }

    pub async fn create_task(&self, mut task: NewTask) -> Result<Task, CrmError> {
        if task.title.trim().is_empty() {
            return Err(CrmError::Invalid("Task title is required".to_string()));
        }
        if task.status.is_empty() {
            task.status = TaskStatus::Todo.to_string();
        }
        validate_task_status(&task.status)?;
        Ok(self.store.create_task(task).await?)
    }

    pub async fn update_task(&self, id: Uuid, update: TaskUpdate) -> Result<Task, CrmError> {
        if let Some(status) = &update.status {
            validate_task_status(status)?;
        }
        self.store
            .update_task(id, update)
            .await?
            .ok_or_else(|| CrmError::NotFound("Task not found".to_string()))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, CrmError> {
        Ok(self.store.list_projects().await?)
    }

    pub async fn create_project(&self, name: &str, description: Option<&str>) -> Result<Project, CrmError> {
        if name.trim().is_empty() {
            return Err(CrmError::Invalid("Project name is required".to_string()));
        }
        Ok(self.store.create_project(name.trim(), description).await?)
    }
}

fn validate_task_status(status: &str) -> Result<(), CrmError> {
    status
        .parse::<TaskStatus>()
        .map(|_| ())
        .map_err(|_| CrmError::Invalid("Invalid task status. Must be todo, in_progress, or done".to_string()))
}

fn describe(communication: &Communication) -> String {
    match (&communication.subject, communication.channel.as_str()) {
        (Some(subject), _) => subject.clone(),
        (None, "whatsapp") => "WhatsApp message sent".to_string(),
        (None, channel) => format!("{} {} message", channel, communication.message_type),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{NewLoanApplication, NewPayment, Profile};
    use crate::database::{CrmStore, LoanStore, MemoryStore, ProfileStore};

    fn service() -> (Arc<MemoryStore>, CrmService) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), CrmService::new(store))
    }

    #[test]
    fn lookup_tables_cover_known_statuses() {
        assert_eq!(journey_stage("under_review"), Some("kyc"));
        assert_eq!(journey_stage("rejected"), Some("completion"));
        assert_eq!(relationship_stage("funded"), Some("customer"));
        assert_eq!(lead_status("approved"), Some("converted"));
        assert_eq!(lead_status("funded"), None);
        assert_eq!(initial_relationship_score("completed"), 95);
        assert_eq!(initial_relationship_score("pending"), 0);
        assert_eq!(status_message("funded").map(|m| m.0), Some("Funds Disbursed"));
        assert!(status_message("draft").is_none());
    }

    #[tokio::test]
    async fn status_sync_moves_journey_forward() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        let app = Uuid::new_v4();
        store.add_lead(user, "new").await;

        crm.sync_loan_application_status(app, user, "draft", "submitted", Value::Null)
            .await
            .unwrap();
        crm.sync_loan_application_status(app, user, "submitted", "approved", json!({ "officer": "ops" }))
            .await
            .unwrap();

        let journey = store.list_journey(user).await.unwrap();
        assert_eq!(journey.len(), 2);
        assert_eq!(journey[0].stage, "application");
        assert!(journey[0].stage_exit_date.is_some());
        assert_eq!(journey[0].time_in_stage_hours, Some(0));
        assert_eq!(journey[1].stage, "approval");
        assert_eq!(journey[1].stage_metrics["officer"], "ops");

        let relationship = store.get_relationship(user).await.unwrap().unwrap();
        assert_eq!(relationship.relationship_stage, "customer");
        // score is fixed when the relationship is first created
        assert_eq!(relationship.relationship_score, 40);

        let lead = store.get_lead(user).await.unwrap().unwrap();
        assert_eq!(lead.status, "converted");

        let notices = store.customer_communications(user).await.unwrap();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|c| c.channel == "dashboard"));
    }

    #[tokio::test]
    async fn repeated_status_keeps_single_open_stage() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        for _ in 0..2 {
            crm.sync_loan_application_status(Uuid::new_v4(), user, "draft", "submitted", Value::Null)
                .await
                .unwrap();
        }
        assert_eq!(store.list_journey(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_status_touches_nothing() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        crm.sync_loan_application_status(Uuid::new_v4(), user, "draft", "pending", Value::Null)
            .await
            .unwrap();
        assert!(store.list_journey(user).await.unwrap().is_empty());
        assert!(store.get_relationship(user).await.unwrap().is_none());
        assert!(store.customer_communications(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn new_customer_gets_prospect_records() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        crm.sync_new_customer(user).await.unwrap();

        let relationship = store.get_relationship(user).await.unwrap().unwrap();
        assert_eq!(relationship.relationship_stage, "prospect");
        assert_eq!(relationship.relationship_score, 10);
        assert_eq!(relationship.communication_preferences["sms"], false);

        let journey = store.list_journey(user).await.unwrap();
        assert_eq!(journey[0].stage, "awareness");

        let welcome = store.customer_communications(user).await.unwrap();
        assert_eq!(welcome[0].subject.as_deref(), Some("Welcome to Buffr Lend!"));
        assert_eq!(welcome[0].channel, "email");
    }

    #[tokio::test]
    async fn new_customer_sync_keeps_existing_relationship() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        crm.sync_loan_application_status(Uuid::new_v4(), user, "under_review", "approved", Value::Null)
            .await
            .unwrap();

        crm.sync_new_customer(user).await.unwrap();

        let relationship = store.get_relationship(user).await.unwrap().unwrap();
        assert_eq!(relationship.relationship_stage, "customer");
        assert_eq!(relationship.relationship_score, 80);
    }

    #[test]
    fn health_score_weights_components() {
        let components = HealthComponents {
            payment_history: 100,
            loan_standing: 100,
            engagement: 0,
            kyc: 50,
        };
        assert_eq!(components.score(), 75);
    }

    #[tokio::test]
    async fn health_score_is_stored_with_components() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        let loan = store
            .create_loan(crate::database::models::NewLoan {
                application_id: None,
                user_id: user,
                amount: Decimal::from(1_000),
                term_months: 2,
                interest_rate: Decimal::from(2),
                monthly_payment: Decimal::from(520),
                total_amount: Decimal::from(1_040),
                status: "active".into(),
            })
            .await
            .unwrap();
        for status in ["paid", "failed"] {
            store
                .create_payment(NewPayment {
                    loan_id: loan.id,
                    user_id: user,
                    amount: Decimal::from(520),
                    due_date: Utc::now() - Duration::days(3),
                    paid_at: None,
                    status: status.into(),
                })
                .await
                .unwrap();
        }
        crm.sync_new_customer(user).await.unwrap();

        let record = crm.update_customer_health_score(user).await.unwrap();
        // payments 50, standing 100, one welcome message 10, no documents
        assert_eq!(record.score_components["payment_history"], 50);
        assert_eq!(record.score_components["engagement"], 10);
        assert_eq!(record.health_score, 52);

        let relationship = store.get_relationship(user).await.unwrap().unwrap();
        assert_eq!(relationship.relationship_score, 52);
        assert_eq!(store.health_scores(user).await.len(), 1);
    }

    #[tokio::test]
    async fn partner_performance_counts_approvals() {
        let (store, crm) = service();
        let partner = Uuid::new_v4();
        let start = Utc::now() - Duration::days(1);
        for (status, amount) in [("approved", 2_000), ("active", 4_000), ("rejected", 1_000), ("submitted", 500)] {
            store
                .create_application(NewLoanApplication {
                    user_id: Uuid::new_v4(),
                    company_id: Some(partner),
                    loan_amount: Decimal::from(amount),
                    loan_term: 3,
                    loan_purpose: None,
                    monthly_income: None,
                    monthly_expenses: None,
                    status: status.into(),
                })
                .await
                .unwrap();
        }

        let metrics = crm
            .sync_partner_performance(partner, start, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        assert_eq!(metrics.application_volume, 4);
        assert_eq!(metrics.active_borrowers, 2);
        assert_eq!(metrics.approval_rate, Decimal::from(50));
        assert_eq!(metrics.total_loan_volume, Decimal::from(6_000));
        assert_eq!(metrics.average_loan_amount, Decimal::from(3_000));
    }

    #[tokio::test]
    async fn unknown_sync_action_is_rejected() {
        let (_, crm) = service();
        let err = crm.run_sync("rebuild_everything", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid action");

        let err = crm.run_sync("sync_new_customer", json!({ "userId": "nope" })).await.unwrap_err();
        assert!(matches!(err, CrmError::Invalid(_)));
    }

    #[tokio::test]
    async fn recent_activity_names_the_customer() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        let mut profile = Profile::new(user, "n@example.com", "user");
        profile.first_name = Some("Ndapewa".into());
        profile.last_name = Some("Shilongo".into());
        store.create_profile(profile).await.unwrap();
        crm.sync_new_customer(user).await.unwrap();

        let activities = crm.recent_activities(10).await.unwrap();
        assert_eq!(activities.len(), 1);
        assert_eq!(activities[0].customer_name, "Ndapewa Shilongo");
        assert_eq!(activities[0].description, "Welcome to Buffr Lend!");
    }

    #[tokio::test]
    async fn tasks_validate_title_and_status() {
        let (_, crm) = service();
        let blank = NewTask {
            project_id: None,
            title: "  ".into(),
            description: None,
            assignee_id: None,
            customer_id: None,
            status: String::new(),
            due_date: None,
        };
        assert!(matches!(crm.create_task(blank.clone()).await, Err(CrmError::Invalid(_))));

        let task = crm
            .create_task(NewTask {
                title: "Call borrower".into(),
                ..blank
            })
            .await
            .unwrap();
        assert_eq!(task.status, "todo");

        let bad = TaskUpdate {
            status: Some("archived".into()),
            ..Default::default()
        };
        assert!(matches!(crm.update_task(task.id, bad).await, Err(CrmError::Invalid(_))));

        let done = TaskUpdate {
            status: Some("done".into()),
            ..Default::default()
        };
        assert_eq!(crm.update_task(task.id, done).await.unwrap().status, "done");
    }

    fn new_loan(user: Uuid, status: &str) -> crate::database::models::NewLoan {
        crate::database::models::NewLoan {
            application_id: None,
            user_id: user,
            amount: Decimal::from(1_000),
            term_months: 1,
            interest_rate: Decimal::from(2),
            monthly_payment: Decimal::from(1_020),
            total_amount: Decimal::from(1_020),
            status: status.into(),
        }
    }

    #[tokio::test]
    async fn automation_follows_up_overdue_applications_once() {
        let (store, crm) = service();
        let (waiting, fresh) = (Uuid::new_v4(), Uuid::new_v4());
        for (user, status) in [(waiting, "submitted"), (waiting, "submitted"), (fresh, "pending")] {
            store
                .create_application(NewLoanApplication {
                    user_id: user,
                    company_id: None,
                    loan_amount: Decimal::from(2_000),
                    loan_term: 3,
                    loan_purpose: None,
                    monthly_income: None,
                    monthly_expenses: None,
                    status: status.into(),
                })
                .await
                .unwrap();
        }

        // Nothing is overdue yet
        let report = crm.run_daily_automation(Utc::now()).await.unwrap();
        assert_eq!(report, AutomationReport::default());

        let later = Utc::now() + Duration::days(2);
        let report = crm.run_daily_automation(later).await.unwrap();
        assert_eq!(report.overdue_applications, 2);
        assert_eq!(report.follow_up_tasks, 1);

        let tasks = store
            .list_tasks(&TaskFilter {
                customer_id: Some(waiting),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, FOLLOW_UP_TITLE);
        assert_eq!(tasks[0].status, "todo");
        assert_eq!(tasks[0].due_date, Some(later + Duration::hours(24)));

        let report = crm.run_daily_automation(later).await.unwrap();
        assert_eq!(report.follow_up_tasks, 0);

        // A closed follow-up does not block a new one
        crm.update_task(
            tasks[0].id,
            TaskUpdate {
                status: Some("done".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let report = crm.run_daily_automation(later).await.unwrap();
        assert_eq!(report.follow_up_tasks, 1);
    }

    #[tokio::test]
    async fn automation_reminds_payments_due_tomorrow() {
        let (store, crm) = service();
        let user = Uuid::new_v4();
        let now = Utc::now();
        let tomorrow_noon = now.date_naive().and_time(NaiveTime::MIN).and_utc() + Duration::hours(36);
        let loan = store.create_loan(new_loan(user, "active")).await.unwrap();
        for (due, status) in [
            (tomorrow_noon, "pending"),
            (tomorrow_noon, "paid"),
            (tomorrow_noon + Duration::days(1), "pending"),
        ] {
            store
                .create_payment(NewPayment {
                    loan_id: loan.id,
                    user_id: user,
                    amount: Decimal::new(102_000, 2),
                    due_date: due,
                    paid_at: None,
                    status: status.into(),
                })
                .await
                .unwrap();
        }

        let report = crm.run_daily_automation(now).await.unwrap();
        assert_eq!(report.payment_reminders, 1);
        let sent = store.customer_communications(user).await.unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].channel, "whatsapp");
        assert_eq!(sent[0].subject.as_deref(), Some("Payment Reminder"));
        assert_eq!(
            sent[0].message_content,
            format!("Your payment of N$1020.00 is due on {}.", tomorrow_noon.format("%Y-%m-%d"))
        );

        let report = crm.run_daily_automation(now).await.unwrap();
        assert_eq!(report.payment_reminders, 0);
    }

    #[tokio::test]
    async fn automation_surveys_recently_completed_loans() {
        let (store, crm) = service();
        let (recent, old) = (Uuid::new_v4(), Uuid::new_v4());
        let now = Utc::now();
        for (user, paid_at) in [(recent, now - Duration::hours(5)), (old, now - Duration::days(10))] {
            let loan = store.create_loan(new_loan(user, "completed")).await.unwrap();
            store
                .create_payment(NewPayment {
                    loan_id: loan.id,
                    user_id: user,
                    amount: Decimal::from(1_020),
                    due_date: paid_at,
                    paid_at: Some(paid_at),
                    status: "paid".into(),
                })
                .await
                .unwrap();
        }
        store.create_loan(new_loan(Uuid::new_v4(), "active")).await.unwrap();

        let report = crm.run_daily_automation(now).await.unwrap();
        assert_eq!(report.satisfaction_surveys, 1);
        let sent = store.customer_communications(recent).await.unwrap();
        assert_eq!(sent[0].message_type, "satisfaction_survey");
        assert_eq!(sent[0].channel, "email");
        assert!(store.customer_communications(old).await.unwrap().is_empty());

        let report = crm.run_daily_automation(now).await.unwrap();
        assert_eq!(report.satisfaction_surveys, 0);
    }
}
