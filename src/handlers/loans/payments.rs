// handlers/loans/payments.rs - repayments

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::Payment;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::loan_service::PaymentInput;
use crate::types::PaymentStatus;

/// GET /api/loans/payments - every payment across the caller's loans
pub async fn list(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<Vec<Payment>> {
    let payments = state.loans().list_user_payments(user.user_id).await?;
    Ok(ApiResponse::success(payments))
}

/// POST /api/loans/:id/payments
///
/// ```json
/// { "amount": 2005, "status": "paid" }
/// ```
pub async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(loan_id): Path<Uuid>,
    body: Result<Json<PaymentInput>, JsonRejection>,
) -> ApiResult<Payment> {
    let Json(input) = body?;
    let payment = state.loans().create_payment(&user, loan_id, input).await?;
    Ok(ApiResponse::created(payment).with_message("Payment recorded successfully"))
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusRequest {
    pub status: PaymentStatus,
}

/// PATCH /api/loans/payments/:id - admin reconciliation
pub async fn update_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    body: Result<Json<PaymentStatusRequest>, JsonRejection>,
) -> ApiResult<Payment> {
    user.require_admin()?;
    let Json(request) = body?;
    let payment = state.loans().update_payment_status(id, request.status).await?;
    Ok(ApiResponse::success(payment))
}
