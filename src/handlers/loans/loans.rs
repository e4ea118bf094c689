// handlers/loans/loans.rs - /api/loans, /api/loans/:id, dashboard, eligibility, partners, company search

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::app::AppState;
use crate::calculator::Eligibility;
use crate::database::models::{Loan, LoanUpdate, PartnerCompany};
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::loan_service::{
    ApplicationInput, DashboardStats, EligibilityInput, LoanWithPayments, Origination,
};
use crate::services::whatsapp_service::MessageContext;

/// GET /api/loans - the caller's loans, newest first
pub async fn list(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Vec<Loan>> {
    let loans = state.loans().list_loans(user.user_id).await?;
    Ok(ApiResponse::success(loans))
}

/// POST /api/loans - price and open a new application
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "application": { "id": "...", "status": "pending", "loan_amount": 5000.0 },
///     "loan": { "id": "...", "status": "pending", "monthly_payment": 2005.0 }
///   },
///   "message": "Loan application created successfully"
/// }
/// ```
pub async fn originate(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<ApplicationInput>, JsonRejection>,
) -> ApiResult<Origination> {
    let Json(input) = body?;
    let origination = state.loans().apply(user.user_id, input).await?;

    let profile = state.store.get_profile(user.user_id).await?;
    let mut params = HashMap::new();
    params.insert(
        "customer_name".to_string(),
        profile.as_ref().map(|p| p.display_name()).unwrap_or_else(|| user.email.clone()),
    );
    params.insert("application_id".to_string(), origination.application.id.to_string());
    state
        .whatsapp()
        .notify(
            profile.as_ref().and_then(|p| p.phone_number.as_deref()),
            "welcome_template",
            params,
            MessageContext {
                customer_id: Some(user.user_id),
                loan_id: Some(origination.loan.id),
            },
        )
        .await;

    Ok(ApiResponse::created(origination).with_message("Loan application created successfully"))
}

/// GET /api/loans/:id - one loan with its payments
pub async fn show(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> ApiResult<LoanWithPayments> {
    let loan = state.loans().get_loan(&user, id).await?;
    Ok(ApiResponse::success(loan))
}

/// PATCH /api/loans/:id - admin correction of status or balance
pub async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Result<Json<LoanUpdate>, JsonRejection>,
) -> ApiResult<Loan> {
    user.require_admin()?;
    let Json(update) = body?;
    let loan = state.loans().update_loan(id, update).await?;
    Ok(ApiResponse::success(loan).with_message("Loan updated successfully"))
}

/// GET /api/loans/dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<DashboardStats> {
    let stats = state.loans().dashboard_stats(user.user_id).await?;
    Ok(ApiResponse::success(stats))
}

/// POST /api/loans/eligibility - affordability of an extra loan
pub async fn eligibility(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<EligibilityInput>, JsonRejection>,
) -> ApiResult<Eligibility> {
    let Json(input) = body?;
    let result = state.loans().check_eligibility(user.user_id, input).await?;
    Ok(ApiResponse::success(result))
}

/// GET /api/partners - active partner employers
pub async fn partners(State(state): State<AppState>) -> ApiResult<Vec<PartnerCompany>> {
    let companies = state.loans().partner_companies().await?;
    Ok(ApiResponse::success(companies))
}

#[derive(Debug, Default, Deserialize)]
pub struct CompanySearch {
    pub q: Option<String>,
}

/// GET /api/companies/search?q= - employer lookup for the application form
pub async fn search_companies(
    State(state): State<AppState>,
    Query(search): Query<CompanySearch>,
) -> ApiResult<Vec<PartnerCompany>> {
    let companies = state.loans().search_companies(search.q.as_deref().unwrap_or_default()).await?;
    Ok(ApiResponse::success(companies))
}
