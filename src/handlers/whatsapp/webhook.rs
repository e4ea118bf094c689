// handlers/whatsapp/webhook.rs - POST /api/whatsapp/webhook

use axum::{
    extract::{rejection::FormRejection, State},
    Form,
};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::whatsapp_service::{WebhookOutcome, WebhookPayload};

/// Twilio form callback: inbound messages and delivery status updates
pub async fn receive(
    State(state): State<AppState>,
    form: Result<Form<WebhookPayload>, FormRejection>,
) -> ApiResult<WebhookOutcome> {
    let Form(payload) = form.map_err(|e| ApiError::bad_request(e.body_text()))?;
    if payload.message_sid.is_empty() {
        return Err(ApiError::bad_request("MessageSid is required"));
    }
    let outcome = state.whatsapp().handle_webhook(payload).await?;
    Ok(ApiResponse::success(outcome))
}
