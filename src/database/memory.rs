//! In-process store with the same observable behaviour as the Postgres one.
//!
//! Selected with `BUFFRLEND_STORE=memory`; used by unit tests and by the
//! integration suite, which runs the server binary without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::models::*;
use super::store::*;

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    partner_companies: Vec<PartnerCompany>,
    applications: Vec<LoanApplication>,
    loans: Vec<Loan>,
    payments: Vec<Payment>,
    documents: Vec<Document>,
    syncs: Vec<DocumentSync>,
    admin_activities: Vec<AdminActivity>,
    journey: Vec<JourneyStage>,
    relationships: HashMap<Uuid, CustomerRelationship>,
    communications: Vec<Communication>,
    leads: HashMap<Uuid, Lead>,
    health_scores: Vec<HealthScoreRecord>,
    partner_metrics: Vec<PartnerPerformance>,
    tasks: Vec<Task>,
    projects: Vec<Project>,
    messages: Vec<WhatsAppMessage>,
    refresh_tokens: HashMap<Uuid, RefreshTokenRecord>,
    blacklist: HashMap<Uuid, (Uuid, DateTime<Utc>)>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    #[cfg(test)]
    fail_document_inserts: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a partner company; rows are otherwise managed outside the API
    pub async fn add_partner_company(&self, name: &str, code: &str, is_active: bool) -> PartnerCompany {
        let company = PartnerCompany {
            id: Uuid::new_v4(),
            name: name.to_string(),
            code: code.to_string(),
            is_active,
            created_at: Utc::now(),
        };
        self.tables.write().await.partner_companies.push(company.clone());
        company
    }

    /// Seed a lead row for a customer
    pub async fn add_lead(&self, customer_id: Uuid, status: &str) -> Lead {
        let lead = Lead {
            customer_id,
            status: status.to_string(),
            updated_at: Utc::now(),
        };
        self.tables.write().await.leads.insert(customer_id, lead.clone());
        lead
    }

    /// All admin activity rows, oldest first
    pub async fn admin_activities(&self) -> Vec<AdminActivity> {
        self.tables.read().await.admin_activities.clone()
    }

    /// Every later `insert_document` fails with a query error
    #[cfg(test)]
    pub fn fail_document_inserts(&self) {
        self.fail_document_inserts.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub async fn health_scores(&self, customer_id: Uuid) -> Vec<HealthScoreRecord> {
        self.tables
            .read()
            .await
            .health_scores
            .iter()
            .filter(|r| r.customer_id == customer_id)
            .cloned()
            .collect()
    }
}

fn application_matches(app: &LoanApplication, filter: &ApplicationFilter) -> bool {
    filter.user_id.map_or(true, |id| app.user_id == id)
        && filter.company_id.map_or(true, |id| app.company_id == Some(id))
        && filter.status.as_deref().map_or(true, |s| app.status == s)
        && filter.from.map_or(true, |from| app.application_date >= from)
        && filter.to.map_or(true, |to| app.application_date <= to)
}

fn document_matches(doc: &Document, filter: &DocumentFilter) -> bool {
    filter.user_id.map_or(true, |id| doc.user_id == id)
        && filter
            .loan_application_id
            .map_or(true, |id| doc.loan_application_id == Some(id))
        && filter
            .verification_status
            .as_deref()
            .map_or(true, |s| doc.verification_status == s)
        && filter
            .document_types
            .as_ref()
            .map_or(true, |types| types.iter().any(|t| *t == doc.document_type))
        && filter.uploaded_from.map_or(true, |from| doc.uploaded_at >= from)
        && filter.uploaded_to.map_or(true, |to| doc.uploaded_at <= to)
}

fn activity_matches(activity: &AdminActivity, filter: &ActivityFilter) -> bool {
    filter.admin_id.map_or(true, |id| activity.admin_id == id)
        && filter.target_type.as_deref().map_or(true, |t| activity.target_type == t)
        && filter
            .target_id
            .as_deref()
            .map_or(true, |t| activity.target_id.as_deref() == Some(t))
        && filter.action.as_deref().map_or(true, |a| activity.action == a)
        && filter.from.map_or(true, |from| activity.created_at >= from)
        && filter.to.map_or(true, |to| activity.created_at <= to)
}

fn page<T>(rows: Vec<T>, limit: Option<i64>, offset: Option<i64>) -> Vec<T> {
    let offset = offset.unwrap_or(0).max(0) as usize;
    let limit = limit.map(|l| l.max(0) as usize).unwrap_or(usize::MAX);
    rows.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl ProfileStore for MemoryStore {
    async fn get_profile(&self, id: Uuid) -> StoreResult<Option<Profile>> {
        Ok(self.tables.read().await.profiles.get(&id).cloned())
    }

    async fn create_profile(&self, profile: Profile) -> StoreResult<Profile> {
        let mut tables = self.tables.write().await;
        if tables.profiles.contains_key(&profile.id) {
            return Err(super::DatabaseError::Conflict(format!("profile {} already exists", profile.id)));
        }
        tables.profiles.insert(profile.id, profile.clone());
        Ok(profile)
    }
}

#[async_trait]
impl LoanStore for MemoryStore {
    async fn list_partner_companies(&self) -> StoreResult<Vec<PartnerCompany>> {
        let tables = self.tables.read().await;
        let mut companies: Vec<PartnerCompany> = tables
            .partner_companies
            .iter()
            .filter(|c| c.is_active)
            .cloned()
            .collect();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(companies)
    }

    async fn search_partner_companies(&self, query: &str, limit: i64) -> StoreResult<Vec<PartnerCompany>> {
        let needle = query.to_lowercase();
        let mut companies = self.list_partner_companies().await?;
        companies.retain(|c| c.name.to_lowercase().contains(&needle) || c.code.to_lowercase().contains(&needle));
        Ok(page(companies, Some(limit), None))
    }

    async fn create_application(&self, new: NewLoanApplication) -> StoreResult<LoanApplication> {
        let now = Utc::now();
        let application = LoanApplication {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            company_id: new.company_id,
            loan_amount: new.loan_amount,
            loan_term: new.loan_term,
            loan_purpose: new.loan_purpose,
            monthly_income: new.monthly_income,
            monthly_expenses: new.monthly_expenses,
            status: new.status,
            application_date: now,
            updated_at: now,
        };
        self.tables.write().await.applications.push(application.clone());
        Ok(application)
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<LoanApplication>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<LoanApplication> = tables
            .applications
            .iter()
            .filter(|a| application_matches(a, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.application_date.cmp(&a.application_date));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn count_applications(&self, filter: &ApplicationFilter) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.applications.iter().filter(|a| application_matches(a, filter)).count() as i64)
    }

    async fn get_application(&self, id: Uuid) -> StoreResult<Option<LoanApplication>> {
        Ok(self.tables.read().await.applications.iter().find(|a| a.id == id).cloned())
    }

    async fn update_application_status(&self, id: Uuid, status: &str) -> StoreResult<Option<LoanApplication>> {
        let mut tables = self.tables.write().await;
        Ok(tables.applications.iter_mut().find(|a| a.id == id).map(|app| {
            app.status = status.to_string();
            app.updated_at = Utc::now();
            app.clone()
        }))
    }

    async fn create_loan(&self, new: NewLoan) -> StoreResult<Loan> {
        let loan = Loan {
            id: Uuid::new_v4(),
            application_id: new.application_id,
            user_id: new.user_id,
            amount: new.amount,
            term_months: new.term_months,
            interest_rate: new.interest_rate,
            monthly_payment: new.monthly_payment,
            total_amount: new.total_amount,
            principal_balance: new.amount,
            remaining_balance: new.amount,
            status: new.status,
            created_at: Utc::now(),
        };
        self.tables.write().await.loans.push(loan.clone());
        Ok(loan)
    }

    async fn list_loans(&self, user_id: Uuid) -> StoreResult<Vec<Loan>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Loan> = tables.loans.iter().filter(|l| l.user_id == user_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        Ok(self.tables.read().await.loans.iter().find(|l| l.id == id).cloned())
    }

    async fn list_loans_by_status(&self, status: &str) -> StoreResult<Vec<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.iter().filter(|l| l.status == status).cloned().collect())
    }

    async fn update_loan(&self, id: Uuid, update: LoanUpdate) -> StoreResult<Option<Loan>> {
        let mut tables = self.tables.write().await;
        Ok(tables.loans.iter_mut().find(|l| l.id == id).map(|loan| {
            if let Some(status) = update.status {
                loan.status = status;
            }
            if let Some(balance) = update.remaining_balance {
                loan.remaining_balance = balance;
            }
            loan.clone()
        }))
    }

    async fn active_monthly_obligations(&self, user_id: Uuid) -> StoreResult<Decimal> {
        let tables = self.tables.read().await;
        Ok(tables
            .loans
            .iter()
            .filter(|l| l.user_id == user_id && l.status == "active")
            .map(|l| l.monthly_payment)
            .sum())
    }

    async fn create_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let payment = Payment {
            id: Uuid::new_v4(),
            loan_id: new.loan_id,
            user_id: new.user_id,
            amount: new.amount,
            due_date: new.due_date,
            paid_at: new.paid_at,
            status: new.status,
            created_at: Utc::now(),
        };
        self.tables.write().await.payments.push(payment.clone());
        Ok(payment)
    }

    async fn list_user_payments(&self, user_id: Uuid) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Payment> = tables.payments.iter().filter(|p| p.user_id == user_id).cloned().collect();
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(rows)
    }

    async fn list_loan_payments(&self, loan_id: Uuid) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Payment> = tables.payments.iter().filter(|p| p.loan_id == loan_id).cloned().collect();
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(rows)
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        Ok(self.tables.read().await.payments.iter().find(|p| p.id == id).cloned())
    }

    async fn payments_due_between(
        &self,
        status: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Payment>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Payment> = tables
            .payments
            .iter()
            .filter(|p| p.status == status && p.due_date >= start && p.due_date < end)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(rows)
    }

    async fn update_payment_status(
        &self,
        id: Uuid,
        status: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Payment>> {
        let mut tables = self.tables.write().await;
        Ok(tables.payments.iter_mut().find(|p| p.id == id).map(|payment| {
            payment.status = status.to_string();
            payment.paid_at = paid_at.or(payment.paid_at);
            payment.clone()
        }))
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert_document(&self, new: NewDocument) -> StoreResult<Document> {
        #[cfg(test)]
        let failing = self.fail_document_inserts.load(std::sync::atomic::Ordering::SeqCst);
        #[cfg(not(test))]
        let failing = false;
        if failing {
            return Err(super::DatabaseError::QueryError("documents table unavailable".to_string()));
        }
        let document = Document {
            id: Uuid::new_v4(),
            user_id: new.user_id,
            loan_application_id: new.loan_application_id,
            file_name: new.file_name,
            file_type: new.file_type,
            file_size: new.file_size,
            checksum: new.checksum,
            google_drive_file_id: new.google_drive_file_id,
            google_drive_url: new.google_drive_url,
            document_type: new.document_type,
            verification_status: new.verification_status,
            verified_at: None,
            verified_by: None,
            admin_notes: None,
            rejection_reason: None,
            uploaded_at: Utc::now(),
        };
        self.tables.write().await.documents.push(document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: Uuid) -> StoreResult<Option<Document>> {
        Ok(self.tables.read().await.documents.iter().find(|d| d.id == id).cloned())
    }

    async fn list_documents(&self, filter: &DocumentFilter) -> StoreResult<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Document> = tables
            .documents
            .iter()
            .filter(|d| document_matches(d, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn count_documents(&self, filter: &DocumentFilter) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.documents.iter().filter(|d| document_matches(d, filter)).count() as i64)
    }

    async fn review_document(&self, id: Uuid, review: DocumentReview) -> StoreResult<Option<Document>> {
        let mut tables = self.tables.write().await;
        Ok(tables.documents.iter_mut().find(|d| d.id == id).map(|doc| {
            doc.verification_status = review.verification_status;
            doc.verified_at = Some(review.verified_at);
            doc.verified_by = Some(review.verified_by);
            doc.admin_notes = review.admin_notes;
            doc.rejection_reason = review.rejection_reason;
            doc.clone()
        }))
    }

    async fn insert_sync(&self, sync: DocumentSync) -> StoreResult<DocumentSync> {
        self.tables.write().await.syncs.push(sync.clone());
        Ok(sync)
    }

    async fn get_sync(&self, sync_id: Uuid) -> StoreResult<Option<DocumentSync>> {
        Ok(self.tables.read().await.syncs.iter().find(|s| s.sync_id == sync_id).cloned())
    }

    async fn list_syncs(&self, user_id: Uuid) -> StoreResult<Vec<DocumentSync>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<DocumentSync> = tables.syncs.iter().filter(|s| s.user_id == user_id).cloned().collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn log_admin_activity(&self, new: NewAdminActivity) -> StoreResult<AdminActivity> {
        let activity = AdminActivity {
            id: Uuid::new_v4(),
            admin_id: new.admin_id,
            action: new.action,
            target_type: new.target_type,
            target_id: new.target_id,
            details: new.details,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            created_at: Utc::now(),
        };
        self.tables.write().await.admin_activities.push(activity.clone());
        Ok(activity)
    }

    async fn list_admin_activities(&self, filter: &ActivityFilter) -> StoreResult<Vec<AdminActivity>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<AdminActivity> = tables
            .admin_activities
            .iter()
            .filter(|a| activity_matches(a, filter))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, filter.limit, filter.offset))
    }

    async fn count_admin_activities(&self, filter: &ActivityFilter) -> StoreResult<i64> {
        let tables = self.tables.read().await;
        Ok(tables.admin_activities.iter().filter(|a| activity_matches(a, filter)).count() as i64)
    }
}

#[async_trait]
impl CrmStore for MemoryStore {
    async fn open_journey_stage(&self, customer_id: Uuid) -> StoreResult<Option<JourneyStage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .journey
            .iter()
            .filter(|j| j.customer_id == customer_id && j.stage_exit_date.is_none())
            .max_by_key(|j| j.stage_entry_date)
            .cloned())
    }

    async fn close_journey_stage(
        &self,
        id: Uuid,
        exit_date: DateTime<Utc>,
        time_in_stage_hours: Option<i64>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if let Some(stage) = tables.journey.iter_mut().find(|j| j.id == id) {
            stage.stage_exit_date = Some(exit_date);
            stage.time_in_stage_hours = time_in_stage_hours;
        }
        Ok(())
    }

    async fn insert_journey_stage(
        &self,
        customer_id: Uuid,
        stage: &str,
        metrics: serde_json::Value,
    ) -> StoreResult<JourneyStage> {
        let row = JourneyStage {
            id: Uuid::new_v4(),
            customer_id,
            stage: stage.to_string(),
            stage_entry_date: Utc::now(),
            stage_exit_date: None,
            time_in_stage_hours: None,
            stage_metrics: metrics,
        };
        self.tables.write().await.journey.push(row.clone());
        Ok(row)
    }

    async fn list_journey(&self, customer_id: Uuid) -> StoreResult<Vec<JourneyStage>> {
        let tables = self.tables.read().await;
        Ok(tables.journey.iter().filter(|j| j.customer_id == customer_id).cloned().collect())
    }

    async fn get_relationship(&self, customer_id: Uuid) -> StoreResult<Option<CustomerRelationship>> {
        Ok(self.tables.read().await.relationships.get(&customer_id).cloned())
    }

    async fn upsert_relationship(&self, relationship: CustomerRelationship) -> StoreResult<CustomerRelationship> {
        let mut tables = self.tables.write().await;
        let stored = match tables.relationships.get(&relationship.customer_id) {
            // created_at survives updates, like the ON CONFLICT clause in Postgres
            Some(existing) => CustomerRelationship {
                created_at: existing.created_at,
                ..relationship
            },
            None => relationship,
        };
        tables.relationships.insert(stored.customer_id, stored.clone());
        Ok(stored)
    }

    async fn insert_communication(&self, new: NewCommunication) -> StoreResult<Communication> {
        let row = Communication {
            id: Uuid::new_v4(),
            customer_id: new.customer_id,
            channel: new.channel,
            direction: new.direction,
            message_type: new.message_type,
            subject: new.subject,
            message_content: new.message_content,
            status: new.status,
            created_at: Utc::now(),
        };
        self.tables.write().await.communications.push(row.clone());
        Ok(row)
    }

    async fn recent_communications(&self, limit: i64) -> StoreResult<Vec<Communication>> {
        let tables = self.tables.read().await;
        let mut rows = tables.communications.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(rows, Some(limit), None))
    }

    async fn customer_communications(&self, customer_id: Uuid) -> StoreResult<Vec<Communication>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Communication> = tables
            .communications
            .iter()
            .filter(|c| c.customer_id == customer_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn get_lead(&self, customer_id: Uuid) -> StoreResult<Option<Lead>> {
        Ok(self.tables.read().await.leads.get(&customer_id).cloned())
    }

    async fn update_lead_status(&self, customer_id: Uuid, status: &str) -> StoreResult<Option<Lead>> {
        let mut tables = self.tables.write().await;
        Ok(tables.leads.get_mut(&customer_id).map(|lead| {
            lead.status = status.to_string();
            lead.updated_at = Utc::now();
            lead.clone()
        }))
    }

    async fn insert_health_score(&self, record: HealthScoreRecord) -> StoreResult<HealthScoreRecord> {
        self.tables.write().await.health_scores.push(record.clone());
        Ok(record)
    }

    async fn insert_partner_performance(&self, metrics: PartnerPerformance) -> StoreResult<PartnerPerformance> {
        self.tables.write().await.partner_metrics.push(metrics.clone());
        Ok(metrics)
    }

    async fn list_tasks(&self, filter: &TaskFilter) -> StoreResult<Vec<Task>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Task> = tables
            .tasks
            .iter()
            .filter(|t| {
                filter.project_id.map_or(true, |id| t.project_id == Some(id))
                    && filter.assignee_id.map_or(true, |id| t.assignee_id == Some(id))
                    && filter.customer_id.map_or(true, |id| t.customer_id == Some(id))
                    && filter.status.as_deref().map_or(true, |s| t.status == s)
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create_task(&self, new: NewTask) -> StoreResult<Task> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            project_id: new.project_id,
            title: new.title,
            description: new.description,
            assignee_id: new.assignee_id,
            customer_id: new.customer_id,
            status: new.status,
            due_date: new.due_date,
            created_at: now,
            updated_at: now,
        };
        self.tables.write().await.tasks.push(task.clone());
        Ok(task)
    }

    async fn update_task(&self, id: Uuid, update: TaskUpdate) -> StoreResult<Option<Task>> {
        let mut tables = self.tables.write().await;
        Ok(tables.tasks.iter_mut().find(|t| t.id == id).map(|task| {
            if let Some(title) = update.title {
                task.title = title;
            }
            if let Some(description) = update.description {
                task.description = Some(description);
            }
            if let Some(assignee) = update.assignee_id {
                task.assignee_id = Some(assignee);
            }
            if let Some(status) = update.status {
                task.status = status;
            }
            if let Some(due) = update.due_date {
                task.due_date = Some(due);
            }
            task.updated_at = Utc::now();
            task.clone()
        }))
    }

    async fn list_projects(&self) -> StoreResult<Vec<Project>> {
        let tables = self.tables.read().await;
        let mut rows = tables.projects.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn create_project(&self, name: &str, description: Option<&str>) -> StoreResult<Project> {
        let project = Project {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.map(str::to_string),
            status: "active".to_string(),
            created_at: Utc::now(),
        };
        self.tables.write().await.projects.push(project.clone());
        Ok(project)
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn insert_message(&self, message: WhatsAppMessage) -> StoreResult<WhatsAppMessage> {
        let mut tables = self.tables.write().await;
        if tables.messages.iter().any(|m| m.id == message.id) {
            return Err(super::DatabaseError::Conflict(format!("message {} already stored", message.id)));
        }
        tables.messages.push(message.clone());
        Ok(message)
    }

    async fn update_message_status(
        &self,
        id: &str,
        status: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Option<WhatsAppMessage>> {
        let mut tables = self.tables.write().await;
        Ok(tables.messages.iter_mut().find(|m| m.id == id).map(|message| {
            message.status = status.to_string();
            match status {
                "delivered" => message.delivered_at = Some(at),
                "read" => message.read_at = Some(at),
                _ => {}
            }
            message.clone()
        }))
    }

    async fn customer_messages(&self, customer_id: Uuid) -> StoreResult<Vec<WhatsAppMessage>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<WhatsAppMessage> = tables
            .messages
            .iter()
            .filter(|m| m.customer_id == Some(customer_id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
        Ok(rows)
    }

    async fn messages_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> StoreResult<Vec<WhatsAppMessage>> {
        let tables = self.tables.read().await;
        Ok(tables
            .messages
            .iter()
            .filter(|m| m.sent_at >= start && m.sent_at <= end)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl TokenStore for MemoryStore {
    async fn record_refresh_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.tables.write().await.refresh_tokens.insert(
            jti,
            RefreshTokenRecord {
                jti,
                user_id,
                expires_at,
                revoked: false,
            },
        );
        Ok(())
    }

    async fn get_refresh_token(&self, jti: Uuid) -> StoreResult<Option<RefreshTokenRecord>> {
        Ok(self.tables.read().await.refresh_tokens.get(&jti).cloned())
    }

    async fn revoke_refresh_token(&self, jti: Uuid) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.refresh_tokens.get_mut(&jti) {
            Some(record) if !record.revoked => {
                record.revoked = true;
                true
            }
            _ => false,
        })
    }

    async fn revoke_user_refresh_tokens(&self, user_id: Uuid) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut revoked = 0;
        for record in tables.refresh_tokens.values_mut() {
            if record.user_id == user_id && !record.revoked {
                record.revoked = true;
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn blacklist_token(&self, jti: Uuid, user_id: Uuid, expires_at: DateTime<Utc>) -> StoreResult<()> {
        self.tables.write().await.blacklist.insert(jti, (user_id, expires_at));
        Ok(())
    }

    async fn is_blacklisted(&self, jti: Uuid) -> StoreResult<bool> {
        Ok(self.tables.read().await.blacklist.contains_key(&jti))
    }

    async fn purge_expired_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.blacklist.len() + tables.refresh_tokens.len();
        tables.blacklist.retain(|_, (_, expires_at)| *expires_at > now);
        tables.refresh_tokens.retain(|_, record| record.expires_at > now);
        let after = tables.blacklist.len() + tables.refresh_tokens.len();
        Ok((before - after) as u64)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
