//! Loan origination, applications, repayments and the borrower dashboard.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::calculator::{self, CalculatorError, Eligibility};
use crate::database::models::{
    ApplicationFilter, Loan, LoanApplication, LoanUpdate, NewLoan, NewLoanApplication, NewPayment,
    PartnerCompany, Payment,
};
use crate::database::{DatabaseError, Store};
use crate::middleware::{AuthUser, Pagination};
use crate::types::{ApplicationStatus, LoanStatus, PaymentStatus};

#[derive(Debug, Error)]
pub enum LoanError {
    #[error("{0}")]
    Invalid(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Calculator(#[from] CalculatorError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// Body of `POST /api/loans` and `POST /api/loans/applications`
#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationInput {
    pub loan_amount: Decimal,
    pub loan_term: i32,
    #[serde(default)]
    pub loan_purpose: Option<String>,
    #[serde(default)]
    pub company_id: Option<Uuid>,
    #[serde(default)]
    pub monthly_income: Option<Decimal>,
    #[serde(default)]
    pub monthly_expenses: Option<Decimal>,
    /// Only honoured by `create_application`; origination always starts at `pending`
    #[serde(default)]
    pub status: Option<ApplicationStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Origination {
    pub application: LoanApplication,
    pub loan: Loan,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoanWithPayments {
    #[serde(flatten)]
    pub loan: Loan,
    pub payments: Vec<Payment>,
}

/// Old and new status, handed to the CRM sync after an update
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub application: LoanApplication,
    pub old_status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentInput {
    pub amount: Decimal,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: Option<PaymentStatus>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DashboardStats {
    pub total_loans: usize,
    pub active_loans: usize,
    pub total_borrowed: Decimal,
    pub total_repaid: Decimal,
    pub outstanding_balance: Decimal,
    pub next_payment_amount: Option<Decimal>,
    pub next_payment_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EligibilityInput {
    pub loan_amount: Decimal,
    #[serde(default)]
    pub monthly_salary: Option<Decimal>,
}

#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn Store>,
}

impl LoanService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn partner_companies(&self) -> Result<Vec<PartnerCompany>, LoanError> {
        Ok(self.store.list_partner_companies().await?)
    }

    /// Up to 20 active partners whose name or code contains `query`
    pub async fn search_companies(&self, query: &str) -> Result<Vec<PartnerCompany>, LoanError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(LoanError::Invalid("Query parameter is required".to_string()));
        }
        Ok(self.store.search_partner_companies(query, 20).await?)
    }

    fn validate_terms(input: &ApplicationInput) -> Result<(), LoanError> {
        let amount = calculator::validate_loan_amount(input.loan_amount);
        if let Some(error) = amount.error {
            return Err(LoanError::Invalid(error));
        }
        let term = calculator::validate_loan_term(Decimal::from(input.loan_term));
        if let Some(error) = term.error {
            return Err(LoanError::Invalid(error));
        }
        Ok(())
    }

    /// Income for pricing: the application's figure, else the profile's, else zero
    async fn pricing_income(&self, user_id: Uuid, declared: Option<Decimal>) -> Result<Decimal, LoanError> {
        if let Some(income) = declared {
            return Ok(income);
        }
        let profile = self.store.get_profile(user_id).await?;
        Ok(profile.and_then(|p| p.monthly_income).unwrap_or(Decimal::ZERO))
    }

    /// Creates a `pending` application together with its priced loan record.
    pub async fn apply(&self, user_id: Uuid, input: ApplicationInput) -> Result<Origination, LoanError> {
        Self::validate_terms(&input)?;
        let income = self.pricing_income(user_id, input.monthly_income).await?;
        let quote = calculator::origination_quote(input.loan_amount, input.loan_term, income)?;

        let application = self
            .store
            .create_application(NewLoanApplication {
                user_id,
                company_id: input.company_id,
                loan_amount: input.loan_amount,
                loan_term: input.loan_term,
                loan_purpose: input.loan_purpose,
                monthly_income: input.monthly_income,
                monthly_expenses: input.monthly_expenses,
                status: ApplicationStatus::Pending.to_string(),
            })
            .await?;

        let loan = self
            .store
            .create_loan(NewLoan {
                application_id: Some(application.id),
                user_id,
                amount: application.loan_amount,
                term_months: application.loan_term,
                interest_rate: quote.interest_rate,
                monthly_payment: quote.monthly_payment,
                total_amount: quote.total_amount,
                status: LoanStatus::Pending.to_string(),
            })
            .await?;

        info!("Originated loan {} for application {}", loan.id, application.id);
        Ok(Origination { application, loan })
    }

    pub async fn create_application(&self, user_id: Uuid, input: ApplicationInput) -> Result<LoanApplication, LoanError> {
        Self::validate_terms(&input)?;
        let status = input.status.unwrap_or(ApplicationStatus::Pending);

        Ok(self
            .store
            .create_application(NewLoanApplication {
                user_id,
                company_id: input.company_id,
                loan_amount: input.loan_amount,
                loan_term: input.loan_term,
                loan_purpose: input.loan_purpose,
                monthly_income: input.monthly_income,
                monthly_expenses: input.monthly_expenses,
                status: status.to_string(),
            })
            .await?)
    }

    /// Users see their own applications; admins see everyone's, optionally by status.
    pub async fn list_applications(
        &self,
        caller: &AuthUser,
        status: Option<ApplicationStatus>,
        page: Option<i64>,
        limit: Option<i64>,
    ) -> Result<(Vec<LoanApplication>, Pagination), LoanError> {
        let (page, limit) = Pagination::normalize(page, limit, 20);
        let mut filter = ApplicationFilter {
            status: status.map(|s| s.to_string()),
            ..Default::default()
        };
        if !caller.is_admin() {
            filter.user_id = Some(caller.user_id);
        }

        let total = self.store.count_applications(&filter).await?;
        filter.limit = Some(limit);
        filter.offset = Some(Pagination::offset(page, limit));
        let applications = self.store.list_applications(&filter).await?;

        Ok((applications, Pagination::new(page, limit, total)))
    }

    /// Someone else's application reads as missing unless the caller is an admin.
    pub async fn get_application(&self, caller: &AuthUser, id: Uuid) -> Result<LoanApplication, LoanError> {
        self.store
            .get_application(id)
            .await?
            .filter(|app| caller.is_admin() || app.user_id == caller.user_id)
            .ok_or_else(|| LoanError::NotFound("Loan application not found".to_string()))
    }

    pub async fn update_application_status(
        &self,
        id: Uuid,
        status: ApplicationStatus,
    ) -> Result<StatusChange, LoanError> {
        let existing = self
            .store
            .get_application(id)
            .await?
            .ok_or_else(|| LoanError::NotFound("Loan application not found".to_string()))?;

        let application = self
            .store
            .update_application_status(id, status.as_str())
            .await?
            .ok_or_else(|| LoanError::NotFound("Loan application not found".to_string()))?;

        info!("Application {} moved {} -> {}", id, existing.status, status);
        Ok(StatusChange {
            application,
            old_status: existing.status,
        })
    }

    pub async fn list_loans(&self, user_id: Uuid) -> Result<Vec<Loan>, LoanError> {
        Ok(self.store.list_loans(user_id).await?)
    }

    async fn owned_loan(&self, caller: &AuthUser, id: Uuid) -> Result<Loan, LoanError> {
        self.store
            .get_loan(id)
            .await?
            .filter(|loan| caller.is_admin() || loan.user_id == caller.user_id)
            .ok_or_else(|| LoanError::NotFound("Loan not found".to_string()))
    }

    pub async fn get_loan(&self, caller: &AuthUser, id: Uuid) -> Result<LoanWithPayments, LoanError> {
        let loan = self.owned_loan(caller, id).await?;
        let payments = self.store.list_loan_payments(loan.id).await?;
        Ok(LoanWithPayments { loan, payments })
    }

    pub async fn update_loan(&self, id: Uuid, update: LoanUpdate) -> Result<Loan, LoanError> {
        if let Some(status) = &update.status {
            status
                .parse::<LoanStatus>()
                .map_err(|e| LoanError::Invalid(e.to_string()))?;
        }
        if update.remaining_balance.is_some_and(|b| b < Decimal::ZERO) {
            return Err(LoanError::Invalid("Remaining balance cannot be negative".to_string()));
        }
        self.store
            .update_loan(id, update)
            .await?
            .ok_or_else(|| LoanError::NotFound("Loan not found".to_string()))
    }

    pub async fn list_user_payments(&self, user_id: Uuid) -> Result<Vec<Payment>, LoanError> {
        Ok(self.store.list_user_payments(user_id).await?)
    }

    /// Records a repayment against a loan. A `paid` payment reduces the
    /// remaining balance and completes the loan once it reaches zero.
    pub async fn create_payment(&self, caller: &AuthUser, loan_id: Uuid, input: PaymentInput) -> Result<Payment, LoanError> {
        if input.amount <= Decimal::ZERO {
            return Err(LoanError::Invalid("Payment amount must be greater than 0".to_string()));
        }
        let loan = self.owned_loan(caller, loan_id).await?;
        let status = input.status.unwrap_or(PaymentStatus::Paid);
        let now = Utc::now();

        let payment = self
            .store
            .create_payment(NewPayment {
                loan_id: loan.id,
                user_id: loan.user_id,
                amount: input.amount,
                due_date: input.due_date.unwrap_or(now),
                paid_at: (status == PaymentStatus::Paid).then_some(now),
                status: status.to_string(),
            })
            .await?;

        if status == PaymentStatus::Paid {
            self.apply_repayment(&loan, payment.amount).await?;
        }
        Ok(payment)
    }

    async fn apply_repayment(&self, loan: &Loan, amount: Decimal) -> Result<(), LoanError> {
        let remaining = (loan.remaining_balance - amount).max(Decimal::ZERO);
        let status = remaining.is_zero().then(|| LoanStatus::Completed.to_string());
        self.store
            .update_loan(
                loan.id,
                LoanUpdate {
                    status,
                    remaining_balance: Some(remaining),
                },
            )
            .await?;
        Ok(())
    }

    /// Admin status change. Only the transition into `paid` applies the
    /// amount to the loan balance; re-marking a paid payment changes nothing.
    pub async fn update_payment_status(&self, id: Uuid, status: PaymentStatus) -> Result<Payment, LoanError> {
        let previous = self
            .store
            .get_payment(id)
            .await?
            .ok_or_else(|| LoanError::NotFound("Payment not found".to_string()))?;
        let newly_paid = status == PaymentStatus::Paid && previous.status != PaymentStatus::Paid.as_str();

        let paid_at = newly_paid.then(Utc::now);
        let payment = self
            .store
            .update_payment_status(id, status.as_str(), paid_at)
            .await?
            .ok_or_else(|| LoanError::NotFound("Payment not found".to_string()))?;

        if newly_paid {
            if let Some(loan) = self.store.get_loan(payment.loan_id).await? {
                self.apply_repayment(&loan, payment.amount).await?;
            }
        }
        Ok(payment)
    }

    pub async fn dashboard_stats(&self, user_id: Uuid) -> Result<DashboardStats, LoanError> {
        let (loans, payments) = futures::try_join!(
            self.store.list_loans(user_id),
            self.store.list_user_payments(user_id)
        )?;
        Ok(summarize(&loans, &payments, Utc::now()))
    }

    /// Affordability against the user's active loans; salary defaults to the profile's income
    pub async fn check_eligibility(&self, user_id: Uuid, input: EligibilityInput) -> Result<Eligibility, LoanError> {
        let salary = self.pricing_income(user_id, input.monthly_salary).await?;
        if salary <= Decimal::ZERO {
            return Err(CalculatorError::NonPositiveSalary.into());
        }
        let current = self.store.active_monthly_obligations(user_id).await?;
        Ok(calculator::check_eligibility(current, input.loan_amount, salary)?)
    }
}

fn summarize(loans: &[Loan], payments: &[Payment], now: DateTime<Utc>) -> DashboardStats {
    let active = LoanStatus::Active.as_str();
    let paid = PaymentStatus::Paid.as_str();
    let pending = PaymentStatus::Pending.as_str();

    let next_payment = payments
        .iter()
        .filter(|p| p.status == pending && p.due_date >= now)
        .min_by_key(|p| p.due_date);

    DashboardStats {
        total_loans: loans.len(),
        active_loans: loans.iter().filter(|l| l.status == active).count(),
        total_borrowed: loans.iter().map(|l| l.amount).sum(),
        total_repaid: payments.iter().filter(|p| p.status == paid).map(|p| p.amount).sum(),
        outstanding_balance: loans
            .iter()
            .filter(|l| l.status == active)
            .map(|l| l.remaining_balance)
            .sum(),
        next_payment_amount: next_payment.map(|p| p.amount),
        next_payment_date: next_payment.map(|p| p.due_date),
    }
}
