use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use super::PgStore;
use crate::database::models::*;
use crate::database::store::{LoanStore, StoreResult};

fn push_application_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &ApplicationFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id);
    }
    if let Some(company_id) = filter.company_id {
        qb.push(" AND company_id = ").push_bind(company_id);
    }
    if let Some(status) = &filter.status {
        qb.push(" AND status = ").push_bind(status.clone());
    }
    if let Some(from) = filter.from {
        qb.push(" AND application_date >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND application_date <= ").push_bind(to);
    }
}

#[async_trait]
impl LoanStore for PgStore {
    async fn list_partner_companies(&self) -> StoreResult<Vec<PartnerCompany>> {
        let rows = sqlx::query_as::<_, PartnerCompany>(
            "SELECT * FROM partner_companies WHERE is_active = TRUE ORDER BY name",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn search_partner_companies(&self, query: &str, limit: i64) -> StoreResult<Vec<PartnerCompany>> {
        let pattern = format!("%{}%", query.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query_as::<_, PartnerCompany>(
            r#"SELECT * FROM partner_companies
               WHERE is_active = TRUE AND (name ILIKE $1 OR code ILIKE $1)
               ORDER BY name
               LIMIT $2"#,
        )
        .bind(pattern)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn create_application(&self, new: NewLoanApplication) -> StoreResult<LoanApplication> {
        let row = sqlx::query_as::<_, LoanApplication>(
            r#"INSERT INTO loan_applications
                   (id, user_id, company_id, loan_amount, loan_term, loan_purpose, monthly_income, monthly_expenses, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(new.company_id)
        .bind(new.loan_amount)
        .bind(new.loan_term)
        .bind(new.loan_purpose)
        .bind(new.monthly_income)
        .bind(new.monthly_expenses)
        .bind(new.status)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn list_applications(&self, filter: &ApplicationFilter) -> StoreResult<Vec<LoanApplication>> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT * FROM loan_applications");
        push_application_filter(&mut qb, filter);
        qb.push(" ORDER BY application_date DESC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset);
        }
        let rows = qb.build_query_as::<LoanApplication>().fetch_all(self.pool()).await?;
        Ok(rows)
    }

    async fn count_applications(&self, filter: &ApplicationFilter) -> StoreResult<i64> {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM loan_applications");
        push_application_filter(&mut qb, filter);
        let count = qb.build_query_scalar::<i64>().fetch_one(self.pool()).await?;
        Ok(count)
    }

    async fn get_application(&self, id: Uuid) -> StoreResult<Option<LoanApplication>> {
        let row = sqlx::query_as::<_, LoanApplication>("SELECT * FROM loan_applications WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn update_application_status(&self, id: Uuid, status: &str) -> StoreResult<Option<LoanApplication>> {
        let row = sqlx::query_as::<_, LoanApplication>(
            "UPDATE loan_applications SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn create_loan(&self, new: NewLoan) -> StoreResult<Loan> {
        let row = sqlx::query_as::<_, Loan>(
            r#"INSERT INTO loans
                   (id, application_id, user_id, amount, term_months, interest_rate, monthly_payment,
                    total_amount, principal_balance, remaining_balance, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $4, $4, $9)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.application_id)
        .bind(new.user_id)
        .bind(new.amount)
        .bind(new.term_months)
        .bind(new.interest_rate)
        .bind(new.monthly_payment)
        .bind(new.total_amount)
        .bind(new.status)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn list_loans(&self, user_id: Uuid) -> StoreResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        let row = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn list_loans_by_status(&self, status: &str) -> StoreResult<Vec<Loan>> {
        let rows = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE status = $1 ORDER BY created_at")
            .bind(status)
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    async fn update_loan(&self, id: Uuid, update: LoanUpdate) -> StoreResult<Option<Loan>> {
        let row = sqlx::query_as::<_, Loan>(
            r#"UPDATE loans
               SET status = COALESCE($2, status),
                   remaining_balance = COALESCE($3, remaining_balance)
               WHERE id = $1
               RETURNING *"#,
        )
        .bind(id)
        .bind(update.status)
        .bind(update.remaining_balance)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    async fn active_monthly_obligations(&self, user_id: Uuid) -> StoreResult<Decimal> {
        let total: Decimal = sqlx::query_scalar(
            "SELECT COALESCE(SUM(monthly_payment), 0) FROM loans WHERE user_id = $1 AND status = 'active'",
        )
        .bind(user_id)
        .fetch_one(self.pool())
        .await?;
        Ok(total)
    }

    async fn create_payment(&self, new: NewPayment) -> StoreResult<Payment> {
        let row = sqlx::query_as::<_, Payment>(
            r#"INSERT INTO payments (id, loan_id, user_id, amount, due_date, paid_at, status)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(new.loan_id)
        .bind(new.user_id)
        .bind(new.amount)
        .bind(new.due_date)
        .bind(new.paid_at)
        .bind(new.status)
        .fetch_one(self.pool())
        .await?;
        Ok(row)
    }

    async fn list_user_payments(&self, user_id: Uuid) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE user_id = $1 ORDER BY due_date")
            .bind(user_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    async fn list_loan_payments(&self, loan_id: Uuid) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE loan_id = $1 ORDER BY due_date")
            .bind(loan_id)
            .fetch_all(self.pool())
            .await?;
        Ok(rows)
    }

    async fn get_payment(&self, id: Uuid) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(row)
    }

    async fn payments_due_between(
        &self,
        status: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Payment>> {
        let rows = sqlx::query_as::<_, Payment>(
            "SELECT * FROM payments WHERE status = $1 AND due_date >= $2 AND due_date < $3 ORDER BY due_date",
        )
        .bind(status)
        .bind(start)
        .bind(end)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    async fn update_payment_status(
        &self,
        id: Uuid,
        status: &str,
        paid_at: Option<DateTime<Utc>>,
    ) -> StoreResult<Option<Payment>> {
        let row = sqlx::query_as::<_, Payment>(
            "UPDATE payments SET status = $2, paid_at = COALESCE($3, paid_at) WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(status)
        .bind(paid_at)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }
}
