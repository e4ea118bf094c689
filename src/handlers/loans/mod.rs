// handlers/loans/mod.rs - loan origination, applications, repayments and partners

use axum::{
    routing::{get, patch, post},
    Router,
};

use crate::app::AppState;

pub mod applications;
pub mod loans;
pub mod payments;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", get(loans::list).post(loans::originate))
        .route("/api/loans/dashboard", get(loans::dashboard))
        .route("/api/loans/eligibility", post(loans::eligibility))
        .route("/api/loans/applications", get(applications::list).post(applications::create))
        .route("/api/loans/applications/:id", get(applications::show))
        .route("/api/loans/applications/:id/status", patch(applications::update_status))
        .route("/api/loans/payments", get(payments::list))
        .route("/api/loans/payments/:id", patch(payments::update_status))
        .route("/api/loans/:id", get(loans::show).patch(loans::update))
        .route("/api/loans/:id/payments", post(payments::create))
        .route("/api/partners", get(loans::partners))
        .route("/api/companies/search", get(loans::search_companies))
}
