//! Twilio Messages API client for WhatsApp delivery.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::WhatsAppConfig;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("WhatsApp messaging is not configured")]
    NotConfigured,

    #[error("Template {0} not found")]
    UnknownTemplate(String),

    #[error("Twilio request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Twilio API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Provider acknowledgement of a queued message
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SentMessage {
    pub sid: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[async_trait]
pub trait MessageSender: Send + Sync {
    /// `to` is an E.164 number without the `whatsapp:` prefix
    async fn send(&self, to: &str, body: &str) -> Result<SentMessage, MessagingError>;

    /// Sender address, including the `whatsapp:` prefix
    fn from_number(&self) -> &str;
}

#[derive(Debug, Deserialize)]
struct TwilioErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<i64>,
}

pub struct TwilioClient {
    http: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    api_base: String,
}

impl TwilioClient {
    pub fn new(config: &WhatsAppConfig) -> Result<Self, MessagingError> {
        let (Some(account_sid), Some(auth_token)) = (&config.account_sid, &config.auth_token) else {
            return Err(MessagingError::NotConfigured);
        };

        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(15)).build()?,
            account_sid: account_sid.clone(),
            auth_token: auth_token.clone(),
            from_number: config.from_number.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn messages_url(&self) -> String {
        format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid)
    }
}

pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{}", number)
    }
}

#[async_trait]
impl MessageSender for TwilioClient {
    async fn send(&self, to: &str, body: &str) -> Result<SentMessage, MessagingError> {
        let to = whatsapp_address(to);
        let response = self
            .http
            .post(self.messages_url())
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("From", self.from_number.as_str()), ("To", to.as_str()), ("Body", body)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error: TwilioErrorBody = response.json().await.unwrap_or(TwilioErrorBody {
                message: None,
                code: None,
            });
            let message = match (error.message, error.code) {
                (Some(message), Some(code)) => format!("{} (code {})", message, code),
                (Some(message), None) => message,
                _ => status.to_string(),
            };
            return Err(MessagingError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let sent: SentMessage = response.json().await?;
        info!("Queued WhatsApp message {} to {}", sent.sid, to);
        Ok(sent)
    }

    fn from_number(&self) -> &str {
        &self.from_number
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn requires_credentials() {
        let config = AppConfig::for_tests().whatsapp;
        assert!(matches!(TwilioClient::new(&config), Err(MessagingError::NotConfigured)));
    }

    #[test]
    fn builds_account_messages_url() {
        let mut config = AppConfig::for_tests().whatsapp;
        config.account_sid = Some("AC123".into());
        config.auth_token = Some("secret".into());
        let client = TwilioClient::new(&config).unwrap();
        assert_eq!(
            client.messages_url(),
            "https://api.twilio.com/2010-04-01/Accounts/AC123/Messages.json"
        );
        assert_eq!(client.from_number(), "whatsapp:+14155238886");
    }

    #[test]
    fn prefixes_whatsapp_channel_once() {
        assert_eq!(whatsapp_address("+264811234567"), "whatsapp:+264811234567");
        assert_eq!(whatsapp_address("whatsapp:+264811234567"), "whatsapp:+264811234567");
    }
}
