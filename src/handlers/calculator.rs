// handlers/calculator.rs - public loan calculator endpoints

use axum::{extract::rejection::JsonRejection, routing::post, Json, Router};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::calculator::{self, FeeBreakdown, LoanDetails, SalaryCompliance};
use crate::middleware::{ApiResponse, ApiResult};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/calculator/quote", post(quote))
        .route("/api/calculator/compliance", post(compliance))
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub loan_amount: Decimal,
    pub term_months: Decimal,
}

#[derive(Debug, Serialize)]
pub struct Quote {
    #[serde(flatten)]
    pub details: LoanDetails,
    pub fees: FeeBreakdown,
    pub formatted: FormattedQuote,
}

#[derive(Debug, Serialize)]
pub struct FormattedQuote {
    pub loan_amount: String,
    pub total_payable: String,
    pub monthly_payment: String,
}

/// POST /api/calculator/quote - fee, interest and repayment breakdown
///
/// ```json
/// { "loan_amount": 5000, "term_months": 3 }
/// ```
pub async fn quote(body: Result<Json<QuoteRequest>, JsonRejection>) -> ApiResult<Quote> {
    let Json(request) = body?;
    let details = calculator::calculate_loan_details(request.loan_amount, request.term_months)?;
    let fees = calculator::calculate_fees(request.loan_amount)?;

    let formatted = FormattedQuote {
        loan_amount: calculator::format_currency(details.loan_amount),
        total_payable: calculator::format_currency(details.total_payable),
        monthly_payment: calculator::format_currency(details.monthly_payment),
    };
    Ok(ApiResponse::success(Quote {
        details,
        fees,
        formatted,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ComplianceRequest {
    pub loan_amount: Decimal,
    pub monthly_salary: Decimal,
}

/// POST /api/calculator/compliance - one-third-of-salary rule
pub async fn compliance(body: Result<Json<ComplianceRequest>, JsonRejection>) -> ApiResult<SalaryCompliance> {
    let Json(request) = body?;
    let result = calculator::validate_salary_compliance(request.loan_amount, request.monthly_salary)?;
    Ok(ApiResponse::success(result))
}
