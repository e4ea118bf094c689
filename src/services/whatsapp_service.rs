//! WhatsApp messaging on top of the Twilio client: templates, outbound
//! delivery, inbound webhooks and delivery analytics.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::database::models::WhatsAppMessage;
use crate::database::{DatabaseError, Store};
use crate::integrations::twilio::{MessageSender, MessagingError};
use crate::types::{MessageDirection, MessageStatus};

#[derive(Debug, Error)]
pub enum WhatsAppError {
    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageTemplate {
    pub name: String,
    pub category: String,
    pub language: String,
    #[serde(default)]
    pub header: Option<String>,
    pub body: String,
    #[serde(default)]
    pub footer: Option<String>,
}

impl MessageTemplate {
    /// `header\n\nbody\n\n_footer_` with `{{key}}` placeholders substituted
    pub fn render(&self, params: &HashMap<String, String>) -> String {
        let body = substitute(&self.body, params);

        let mut message = String::new();
        if let Some(header) = &self.header {
            message.push_str(header);
            message.push_str("\n\n");
        }
        message.push_str(&body);
        message.push_str("\n\n");
        if let Some(footer) = &self.footer {
            message.push('_');
            message.push_str(footer);
            message.push('_');
        }
        message.trim().to_string()
    }
}

/// One left-to-right pass: substituted values are never scanned again, and
/// placeholders without a param stay as written.
fn substitute(text: &str, params: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                match params.get(&after[..end]) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&rest[start..start + 2 + end + 2]),
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

static TEMPLATES: Lazy<Vec<MessageTemplate>> = Lazy::new(|| {
    serde_yaml::from_str(include_str!("templates.yaml")).unwrap_or_else(|e| {
        error!("Failed to parse WhatsApp templates: {}", e);
        Vec::new()
    })
});

pub fn templates() -> &'static [MessageTemplate] {
    &TEMPLATES
}

pub fn find_template(name: &str) -> Option<&'static MessageTemplate> {
    TEMPLATES.iter().find(|template| template.name == name)
}

pub fn render_template(name: &str, params: &HashMap<String, String>) -> Result<String, MessagingError> {
    find_template(name)
        .map(|template| template.render(params))
        .ok_or_else(|| MessagingError::UnknownTemplate(name.to_string()))
}

/// Normalise a local or international number to `+264…`
pub fn format_phone_number(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();

    if digits.starts_with("264") {
        format!("+{}", digits)
    } else if let Some(rest) = digits.strip_prefix('0') {
        format!("+264{}", rest)
    } else {
        format!("+264{}", digits)
    }
}

const HELP_MENU: &str = "Hello! How can we help you today? You can:\n\n1. Check your loan status\n2. Make a payment\n3. Update your information\n4. Speak to support\n\nPlease reply with the number of your choice.";
const STATUS_REPLY: &str = "To check your loan status, please provide your loan reference number or ID number.";
const PAYMENT_REPLY: &str = "To make a payment, please ensure you have sufficient funds in your account. Payments are automatically deducted on the due date.";
const DEFAULT_REPLY: &str = "Thank you for your message. Our team will get back to you shortly. For immediate assistance, please call our support line.";

/// Keyword-driven reply to an inbound message
pub fn auto_reply(body: &str) -> &'static str {
    let text = body.to_lowercase();
    if text.contains("help") || text.contains("support") {
        HELP_MENU
    } else if text.contains("status") || text.contains('1') {
        STATUS_REPLY
    } else if text.contains("payment") || text.contains('2') {
        PAYMENT_REPLY
    } else {
        DEFAULT_REPLY
    }
}

/// Twilio webhook form fields
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebhookPayload {
    pub message_sid: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub message_status: Option<String>,
    #[serde(default)]
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WebhookOutcome {
    pub stored_inbound: bool,
    pub reply: Option<String>,
    pub status_updated: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAnalytics {
    pub total: usize,
    pub sent: usize,
    pub delivered: usize,
    pub read: usize,
    pub failed: usize,
    pub delivery_rate: f64,
    pub read_rate: f64,
    pub failure_rate: f64,
}

impl MessageAnalytics {
    fn from_messages(messages: &[WhatsAppMessage]) -> Self {
        let count = |status: MessageStatus| messages.iter().filter(|m| m.status == status.as_str()).count();
        let total = messages.len();
        let rate = |n: usize| if total > 0 { n as f64 / total as f64 * 100.0 } else { 0.0 };

        let delivered = count(MessageStatus::Delivered);
        let read = count(MessageStatus::Read);
        let failed = count(MessageStatus::Failed);
        Self {
            total,
            sent: count(MessageStatus::Sent),
            delivered,
            read,
            failed,
            delivery_rate: rate(delivered),
            read_rate: rate(read),
            failure_rate: rate(failed),
        }
    }
}

/// Who an outbound message concerns, for the message log
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageContext {
    pub customer_id: Option<Uuid>,
    pub loan_id: Option<Uuid>,
}

pub struct WhatsAppService {
    store: Arc<dyn Store>,
    sender: Option<Arc<dyn MessageSender>>,
}

impl WhatsAppService {
    pub fn new(store: Arc<dyn Store>, sender: Option<Arc<dyn MessageSender>>) -> Self {
        Self { store, sender }
    }

    fn sender(&self) -> Result<&dyn MessageSender, MessagingError> {
        self.sender.as_deref().ok_or(MessagingError::NotConfigured)
    }

    pub async fn send_template_message(
        &self,
        to: &str,
        template_name: &str,
        params: &HashMap<String, String>,
        context: MessageContext,
    ) -> Result<WhatsAppMessage, WhatsAppError> {
        let content = render_template(template_name, params)?;
        self.deliver(to, content, Some(template_name), context).await
    }

    pub async fn send_text_message(
        &self,
        to: &str,
        body: &str,
        context: MessageContext,
    ) -> Result<WhatsAppMessage, WhatsAppError> {
        self.deliver(to, body.to_string(), None, context).await
    }

    async fn deliver(
        &self,
        to: &str,
        content: String,
        template_name: Option<&str>,
        context: MessageContext,
    ) -> Result<WhatsAppMessage, WhatsAppError> {
        let sender = self.sender()?;
        let phone_number = format_phone_number(to);
        let sent = sender.send(&phone_number, &content).await?;

        let message = WhatsAppMessage {
            id: sent.sid,
            customer_id: context.customer_id,
            loan_id: context.loan_id,
            phone_number,
            direction: MessageDirection::Outbound.to_string(),
            message_type: if template_name.is_some() { "template" } else { "text" }.to_string(),
            template_name: template_name.map(str::to_string),
            content,
            status: MessageStatus::Sent.to_string(),
            sent_at: Utc::now(),
            delivered_at: None,
            read_at: None,
        };
        Ok(self.store.insert_message(message).await?)
    }

    /// Send a template and swallow any failure; notifications never fail
    /// the request that triggered them.
    pub async fn notify(&self, to: Option<&str>, template_name: &str, params: HashMap<String, String>, context: MessageContext) {
        let Some(to) = to.filter(|number| !number.trim().is_empty()) else {
            warn!("Skipping {} notification: no recipient number", template_name);
            return;
        };
        if self.sender.is_none() {
            warn!("Skipping {} notification: WhatsApp is not configured", template_name);
            return;
        }
        if let Err(e) = self.send_template_message(to, template_name, &params, context).await {
            error!("Failed to send {} notification: {}", template_name, e);
        }
    }

    /// Inbound messages are stored and answered; status callbacks update the
    /// stored outbound message.
    pub async fn handle_webhook(&self, payload: WebhookPayload) -> Result<WebhookOutcome, WhatsAppError> {
        let mut outcome = WebhookOutcome::default();
        let phone_number = payload
            .from
            .as_deref()
            .map(|from| from.trim_start_matches("whatsapp:").to_string())
            .unwrap_or_default();

        if let Some(body) = payload.body.as_deref() {
            let inbound = WhatsAppMessage {
                id: payload.message_sid.clone(),
                customer_id: None,
                loan_id: None,
                phone_number: phone_number.clone(),
                direction: MessageDirection::Inbound.to_string(),
                message_type: "text".to_string(),
                template_name: None,
                content: body.to_string(),
                status: MessageStatus::Received.to_string(),
                sent_at: Utc::now(),
                delivered_at: None,
                read_at: None,
            };
            self.store.insert_message(inbound).await?;
            outcome.stored_inbound = true;
            info!("Received WhatsApp message {} from {}", payload.message_sid, phone_number);

            let reply = auto_reply(body);
            match self.send_text_message(&phone_number, reply, MessageContext::default()).await {
                Ok(_) => outcome.reply = Some(reply.to_string()),
                Err(e) => warn!("Auto-reply to {} not sent: {}", phone_number, e),
            }
        }

        if let Some(status) = payload.message_status.as_deref() {
            let status = status.to_lowercase();
            if status != MessageStatus::Received.as_str() {
                outcome.status_updated = self
                    .store
                    .update_message_status(&payload.message_sid, &status, Utc::now())
                    .await?
                    .is_some();
            }
        }

        Ok(outcome)
    }

    pub async fn message_analytics(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<MessageAnalytics, WhatsAppError> {
        let messages = self.store.messages_between(start, end).await?;
        Ok(MessageAnalytics::from_messages(&messages))
    }

    pub async fn customer_communications(&self, customer_id: Uuid) -> Result<Vec<WhatsAppMessage>, WhatsAppError> {
        Ok(self.store.customer_messages(customer_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{MemoryStore, MessageStore};
    use crate::testing::RecordingSender;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn formats_namibian_numbers() {
        assert_eq!(format_phone_number("081 123 4567"), "+264811234567");
        assert_eq!(format_phone_number("+264 81 123 4567"), "+264811234567");
        assert_eq!(format_phone_number("811234567"), "+264811234567");
        assert_eq!(format_phone_number("(264) 81-123-4567"), "+264811234567");
    }

    #[test]
    fn bundled_templates_parse() {
        let names: Vec<&str> = templates().iter().map(|t| t.name.as_str()).collect();
        for expected in [
            "welcome_template",
            "loan_approved",
            "payment_reminder",
            "document_uploaded",
            "document_verified",
            "document_rejected",
        ] {
            assert!(names.contains(&expected), "missing template {}", expected);
        }
    }

    #[test]
    fn renders_header_body_footer() {
        let text = render_template("payment_reminder", &params(&[
            ("customer_name", "Ndapewa"),
            ("amount", "2005"),
            ("due_date", "2025-03-25"),
        ]))
        .unwrap();

        assert!(text.starts_with("Payment Reminder\n\nHello Ndapewa,"));
        assert!(text.contains("N$2005 is due on 2025-03-25"));
        assert!(text.ends_with("\n\n_BuffrLend_"));
    }

    #[test]
    fn substituted_values_are_not_rescanned() {
        let template = MessageTemplate {
            name: "t".into(),
            category: "utility".into(),
            language: "en".into(),
            header: None,
            body: "Hi {{customer_name}}, reason: {{reason}}. {{unknown}} {{open".into(),
            footer: None,
        };
        let text = template.render(&params(&[("customer_name", "{{reason}}"), ("reason", "Blurry")]));
        assert_eq!(text, "Hi {{reason}}, reason: Blurry. {{unknown}} {{open");
    }

    #[test]
    fn unknown_template_is_an_error() {
        let err = render_template("missing", &HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Template missing not found");
    }

    #[test]
    fn auto_reply_keywords() {
        assert_eq!(auto_reply("HELP please"), HELP_MENU);
        assert_eq!(auto_reply("I need support"), HELP_MENU);
        assert_eq!(auto_reply("status"), STATUS_REPLY);
        assert_eq!(auto_reply("1"), STATUS_REPLY);
        assert_eq!(auto_reply("payment due?"), PAYMENT_REPLY);
        assert_eq!(auto_reply("2"), PAYMENT_REPLY);
        assert_eq!(auto_reply("hi there"), DEFAULT_REPLY);
    }

    #[tokio::test]
    async fn sent_messages_are_logged() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::default());
        let service = WhatsAppService::new(store.clone(), Some(sender.clone()));
        let customer_id = Uuid::new_v4();

        let message = service
            .send_text_message("0811234567", "Hello", MessageContext { customer_id: Some(customer_id), loan_id: None })
            .await
            .unwrap();

        assert_eq!(message.phone_number, "+264811234567");
        assert_eq!(message.status, "sent");
        assert_eq!(sender.sent().await, vec![("+264811234567".to_string(), "Hello".to_string())]);
        assert_eq!(store.customer_messages(customer_id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_sender_fails_and_notify_skips() {
        let service = WhatsAppService::new(Arc::new(MemoryStore::new()), None);
        let err = service
            .send_text_message("0811234567", "Hello", MessageContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WhatsAppError::Messaging(MessagingError::NotConfigured)));

        // Must not panic or error
        service
            .notify(Some("0811234567"), "document_uploaded", HashMap::new(), MessageContext::default())
            .await;
    }

    #[tokio::test]
    async fn webhook_stores_inbound_and_replies() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::default());
        let service = WhatsAppService::new(store.clone(), Some(sender.clone()));

        let outcome = service
            .handle_webhook(WebhookPayload {
                message_sid: "SM-in-1".into(),
                from: Some("whatsapp:+264811234567".into()),
                body: Some("help".into()),
                message_status: Some("received".into()),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(outcome.stored_inbound);
        assert_eq!(outcome.reply.as_deref(), Some(HELP_MENU));
        assert!(!outcome.status_updated);
        assert_eq!(sender.sent().await[0].0, "+264811234567");
    }

    #[tokio::test]
    async fn status_callbacks_update_known_messages() {
        let store = Arc::new(MemoryStore::new());
        let sender = Arc::new(RecordingSender::default());
        let service = WhatsAppService::new(store.clone(), Some(sender.clone()));
        let sent = service
            .send_text_message("0811234567", "Hello", MessageContext::default())
            .await
            .unwrap();

        let outcome = service
            .handle_webhook(WebhookPayload {
                message_sid: sent.id.clone(),
                message_status: Some("delivered".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(outcome.status_updated);

        let analytics = service
            .message_analytics(Utc::now() - chrono::Duration::hours(1), Utc::now() + chrono::Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(analytics.total, 1);
        assert_eq!(analytics.delivered, 1);
        assert_eq!(analytics.delivery_rate, 100.0);
    }

    #[test]
    fn analytics_of_nothing_is_zero() {
        let analytics = MessageAnalytics::from_messages(&[]);
        assert_eq!(analytics.total, 0);
        assert_eq!(analytics.failure_rate, 0.0);
    }
}
