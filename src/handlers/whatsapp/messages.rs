// handlers/whatsapp/messages.rs - send, templates, analytics, per-customer history

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    Extension, Json,
};
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::app::AppState;
use crate::database::models::WhatsAppMessage;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::services::whatsapp_service::{self, MessageAnalytics, MessageContext, MessageTemplate};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default)]
    pub to: String,
    pub message: Option<String>,
    pub template_name: Option<String>,
    #[serde(default)]
    pub parameters: HashMap<String, String>,
    pub customer_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
}

/// POST /api/whatsapp/send - free text or a named template
///
/// ```json
/// {
///   "to": "0811234567",
///   "templateName": "payment_reminder",
///   "parameters": { "customer_name": "Ndapewa", "amount": "2005", "due_date": "2025-03-25" }
/// }
/// ```
pub async fn send(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Result<Json<SendRequest>, JsonRejection>,
) -> ApiResult<WhatsAppMessage> {
    user.require_admin()?;
    let Json(request) = body?;
    if request.to.trim().is_empty() {
        return Err(ApiError::bad_request("Recipient phone number is required"));
    }

    let context = MessageContext {
        customer_id: request.customer_id,
        loan_id: request.loan_id,
    };
    let service = state.whatsapp();
    let message = match (request.template_name.as_deref(), request.message.as_deref()) {
        (Some(template), _) if !template.is_empty() => {
            service
                .send_template_message(&request.to, template, &request.parameters, context)
                .await?
        }
        (_, Some(text)) if !text.trim().is_empty() => service.send_text_message(&request.to, text, context).await?,
        _ => return Err(ApiError::bad_request("Message or template name is required")),
    };

    Ok(ApiResponse::success(message).with_message("WhatsApp message sent successfully"))
}

/// GET /api/whatsapp/templates
pub async fn templates() -> ApiResult<&'static [MessageTemplate]> {
    Ok(ApiResponse::success(whatsapp_service::templates()))
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalyticsQuery {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

/// GET /api/whatsapp/analytics - delivery rates, last 30 days by default
pub async fn analytics(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<AnalyticsQuery>,
) -> ApiResult<MessageAnalytics> {
    user.require_admin()?;
    let end = query.end.unwrap_or_else(Utc::now);
    let start = query.start.unwrap_or(end - Duration::days(30));
    if end < start {
        return Err(ApiError::bad_request("End date must not be before start date"));
    }
    let analytics = state.whatsapp().message_analytics(start, end).await?;
    Ok(ApiResponse::success(analytics))
}

/// GET /api/whatsapp/communications/:customer_id - admins, or the customer themself
pub async fn communications(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(customer_id): Path<Uuid>,
) -> ApiResult<Vec<WhatsAppMessage>> {
    if customer_id != user.user_id {
        user.require_admin()?;
    }
    let messages = state.whatsapp().customer_communications(customer_id).await?;
    Ok(ApiResponse::success(messages))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use crate::types::UserRole;
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn send_template_to_customer() {
        let app = TestApp::new();
        let (customer, token) = app.user(UserRole::User).await;
        let (_, admin) = app.user(UserRole::Admin).await;

        let (status, body) = app
            .post(
                "/api/whatsapp/send",
                Some(&admin),
                json!({
                    "to": "081 222 2222",
                    "templateName": "payment_reminder",
                    "parameters": { "customer_name": "Ndapewa", "amount": "2005", "due_date": "2025-03-25" },
                    "customerId": customer.id
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["phone_number"], "+264812222222");
        assert_eq!(body["data"]["template_name"], "payment_reminder");

        let (status, body) = app
            .get(&format!("/api/whatsapp/communications/{}", customer.id), Some(&token))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn send_validation() {
        let app = TestApp::new();
        let (_, admin) = app.user(UserRole::Admin).await;

        let (status, body) = app.post("/api/whatsapp/send", Some(&admin), json!({ "message": "hi" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Recipient phone number is required");

        let (status, body) = app.post("/api/whatsapp/send", Some(&admin), json!({ "to": "0811234567" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Message or template name is required");

        let (status, body) = app
            .post("/api/whatsapp/send", Some(&admin), json!({ "to": "0811234567", "templateName": "nope" }))
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Template nope not found");
    }

    #[tokio::test]
    async fn customers_only_see_their_own_history() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::User).await;
        let (status, _) = app
            .get(&format!("/api/whatsapp/communications/{}", uuid::Uuid::new_v4()), Some(&token))
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn templates_and_analytics() {
        let app = TestApp::new();
        let (_, admin) = app.user(UserRole::Admin).await;

        let (status, body) = app.get("/api/whatsapp/templates", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"].as_array().unwrap().len() >= 6);

        app.post("/api/whatsapp/send", Some(&admin), json!({ "to": "0811234567", "message": "hello" }))
            .await;
        let (status, body) = app.get("/api/whatsapp/analytics", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);
        assert_eq!(body["data"]["sent"], 1);
    }
}
