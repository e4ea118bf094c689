//! Google Drive v3 client used for KYC document storage.
//!
//! Authenticates either with a static OAuth token or with a service-account
//! assertion exchanged for a short-lived token, cached until shortly before
//! it expires.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::{FolderRouting, GoogleDriveConfig};
use crate::types::DocumentType;

const FILE_FIELDS: &str = "id,name,mimeType,size,createdTime,webViewLink,parents";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Google Drive is not configured")]
    NotConfigured,

    #[error("Drive file not found: {0}")]
    NotFound(String),

    #[error("Drive authentication failed: {0}")]
    Auth(String),

    #[error("Drive request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Drive API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// File metadata as returned by the Drive API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    /// Drive reports sizes as decimal strings
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
}

impl DriveFile {
    pub fn view_url(&self) -> String {
        self.web_view_link
            .clone()
            .unwrap_or_else(|| format!("https://drive.google.com/file/d/{}/view", self.id))
    }
}

/// Blob storage for uploaded documents
#[async_trait]
pub trait DocumentStorage: Send + Sync {
    async fn upload(&self, file_name: &str, mime_type: &str, content: Vec<u8>, folder_id: &str)
        -> Result<DriveFile, DriveError>;

    async fn get_file(&self, file_id: &str) -> Result<DriveFile, DriveError>;

    /// Add `folder_id` as the only parent, removing the previous ones
    async fn move_to_folder(&self, file_id: &str, folder_id: &str) -> Result<DriveFile, DriveError>;

    async fn delete(&self, file_id: &str) -> Result<(), DriveError>;

    /// Cheap authenticated call, returns the account's user info
    async fn test_connection(&self) -> Result<Value, DriveError>;
}

/// Lowercase substring classification of an uploaded file name
pub fn classify_document(file_name: &str) -> DocumentType {
    let name = file_name.to_lowercase();
    let has = |needle: &str| name.contains(needle);

    if has("national") && has("id") {
        DocumentType::NationalId
    } else if has("passport") {
        DocumentType::Passport
    } else if has("driver") && has("license") {
        DocumentType::DriversLicense
    } else if has("payslip") || has("salary") {
        DocumentType::Payslip
    } else if has("bank") && has("statement") {
        DocumentType::BankStatement
    } else if has("employment") && has("letter") {
        DocumentType::EmploymentLetter
    } else if has("loan") && has("agreement") {
        DocumentType::LoanAgreement
    } else {
        DocumentType::Other
    }
}

pub fn target_folder(routing: &FolderRouting, document_type: DocumentType) -> &str {
    match document_type {
        DocumentType::NationalId => &routing.national_ids,
        DocumentType::Passport => &routing.passports,
        DocumentType::DriversLicense => &routing.drivers_licenses,
        DocumentType::Payslip => &routing.payslips,
        DocumentType::BankStatement => &routing.bank_statements,
        DocumentType::EmploymentLetter => &routing.employment_letters,
        DocumentType::LoanAgreement => &routing.loan_agreements,
        DocumentType::Other => &routing.pending_review,
    }
}

pub fn is_supported_mime_type(config: &GoogleDriveConfig, mime_type: &str) -> bool {
    config.supported_mime_types.iter().any(|supported| supported == mime_type)
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

pub struct GoogleDriveClient {
    http: Client,
    config: GoogleDriveConfig,
    token: Mutex<Option<CachedToken>>,
}

impl GoogleDriveClient {
    pub fn new(config: GoogleDriveConfig) -> Result<Self, DriveError> {
        if !config.is_configured() {
            return Err(DriveError::NotConfigured);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, DriveError> {
        if let Some(token) = &self.config.access_token {
            return Ok(token.clone());
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() + TOKEN_REFRESH_MARGIN {
                return Ok(token.value.clone());
            }
        }

        let fresh = self.exchange_assertion().await?;
        let value = fresh.access_token.clone();
        *cached = Some(CachedToken {
            value: fresh.access_token,
            expires_at: Instant::now() + Duration::from_secs(fresh.expires_in),
        });
        debug!("Obtained Drive access token valid for {}s", fresh.expires_in);
        Ok(value)
    }

    async fn exchange_assertion(&self) -> Result<TokenResponse, DriveError> {
        let (Some(client_email), Some(private_key)) = (&self.config.client_email, &self.config.private_key) else {
            return Err(DriveError::NotConfigured);
        };

        // Keys pasted into env files usually carry literal "\n"
        let pem = private_key.replace("\\n", "\n");
        let key = EncodingKey::from_rsa_pem(pem.as_bytes()).map_err(|e| DriveError::Auth(e.to_string()))?;

        let now = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: client_email,
            scope: self.config.scopes.join(" "),
            aud: &self.config.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let assertion =
            encode(&Header::new(Algorithm::RS256), &claims, &key).map_err(|e| DriveError::Auth(e.to_string()))?;

        let response = self
            .http
            .post(&self.config.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!("token endpoint returned {}: {}", status, body)));
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    async fn file_json(&self, response: Response, file_id: &str) -> Result<DriveFile, DriveError> {
        let response = check_status(response, file_id).await?;
        Ok(response.json::<DriveFile>().await?)
    }
}

/// Map Drive error statuses onto `DriveError`
async fn check_status(response: Response, file_id: &str) -> Result<Response, DriveError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(DriveError::NotFound(file_id.to_string()));
    }

    let body: Value = response.json().await.unwrap_or(Value::Null);
    let message = body["error"]["message"]
        .as_str()
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("unknown error"))
        .to_string();
    Err(DriveError::Api {
        status: status.as_u16(),
        message,
    })
}

/// `multipart/related` body: JSON metadata part followed by the media part
fn multipart_related(boundary: &str, metadata: &Value, mime_type: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 512);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

#[async_trait]
impl DocumentStorage for GoogleDriveClient {
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        content: Vec<u8>,
        folder_id: &str,
    ) -> Result<DriveFile, DriveError> {
        let token = self.access_token().await?;
        let boundary = format!("buffrlend-{}", uuid::Uuid::new_v4().simple());

        let mut metadata = json!({ "name": file_name });
        if !folder_id.is_empty() {
            metadata["parents"] = json!([folder_id]);
        }
        let body = multipart_related(&boundary, &metadata, mime_type, &content);

        let response = self
            .http
            .post(format!("{}/files", self.config.upload_base))
            .query(&[("uploadType", "multipart"), ("fields", FILE_FIELDS)])
            .bearer_auth(token)
            .header("Content-Type", format!("multipart/related; boundary={}", boundary))
            .body(body)
            .send()
            .await?;

        let file = self.file_json(response, file_name).await?;
        info!("Uploaded {} to Drive as {}", file_name, file.id);
        Ok(file)
    }

    async fn get_file(&self, file_id: &str) -> Result<DriveFile, DriveError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/files/{}", self.config.api_base, file_id))
            .query(&[("fields", FILE_FIELDS)])
            .bearer_auth(token)
            .send()
            .await?;
        self.file_json(response, file_id).await
    }

    async fn move_to_folder(&self, file_id: &str, folder_id: &str) -> Result<DriveFile, DriveError> {
        let current = self.get_file(file_id).await?;
        let token = self.access_token().await?;

        let response = self
            .http
            .patch(format!("{}/files/{}", self.config.api_base, file_id))
            .query(&[
                ("addParents", folder_id),
                ("removeParents", current.parents.join(",").as_str()),
                ("fields", FILE_FIELDS),
            ])
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;

        let file = self.file_json(response, file_id).await?;
        info!("Moved Drive file {} to folder {}", file_id, folder_id);
        Ok(file)
    }

    async fn delete(&self, file_id: &str) -> Result<(), DriveError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .delete(format!("{}/files/{}", self.config.api_base, file_id))
            .bearer_auth(token)
            .send()
            .await?;
        check_status(response, file_id).await?;
        info!("Deleted Drive file {}", file_id);
        Ok(())
    }

    async fn test_connection(&self) -> Result<Value, DriveError> {
        let token = self.access_token().await?;
        let response = self
            .http
            .get(format!("{}/about", self.config.api_base))
            .query(&[("fields", "user,storageQuota")])
            .bearer_auth(token)
            .send()
            .await?;
        let response = check_status(response, "about").await?;
        Ok(response.json::<Value>().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;

    #[test]
    fn classifies_by_file_name() {
        assert_eq!(classify_document("National_ID_front.jpg"), DocumentType::NationalId);
        assert_eq!(classify_document("my passport.pdf"), DocumentType::Passport);
        assert_eq!(classify_document("drivers-license.png"), DocumentType::DriversLicense);
        assert_eq!(classify_document("Salary advice March.pdf"), DocumentType::Payslip);
        assert_eq!(classify_document("FNB bank statement.pdf"), DocumentType::BankStatement);
        assert_eq!(classify_document("employment_letter.docx"), DocumentType::EmploymentLetter);
        assert_eq!(classify_document("loan agreement signed.pdf"), DocumentType::LoanAgreement);
        assert_eq!(classify_document("selfie.jpg"), DocumentType::Other);
    }

    #[test]
    fn classification_order_is_fixed() {
        // Both "passport" and "payslip" match; identity documents are checked first
        assert_eq!(classify_document("passport_and_payslip.pdf"), DocumentType::Passport);
    }

    #[test]
    fn routes_types_to_folders() {
        let routing = AppConfig::for_tests().google_drive.folder_routing;
        assert_eq!(target_folder(&routing, DocumentType::Payslip), "folder-payslips");
        assert_eq!(target_folder(&routing, DocumentType::LoanAgreement), "folder-agreements");
        assert_eq!(target_folder(&routing, DocumentType::Other), "folder-pending");
    }

    #[test]
    fn mime_type_allow_list() {
        let config = AppConfig::for_tests().google_drive;
        assert!(is_supported_mime_type(&config, "application/pdf"));
        assert!(is_supported_mime_type(&config, "image/jpeg"));
        assert!(!is_supported_mime_type(&config, "application/x-msdownload"));
    }

    #[test]
    fn multipart_body_layout() {
        let body = multipart_related("b", &json!({"name": "a.pdf"}), "application/pdf", b"PDF");
        let text = String::from_utf8(body).unwrap();
        assert!(text.starts_with("--b\r\nContent-Type: application/json"));
        assert!(text.contains("Content-Type: application/pdf\r\n\r\nPDF\r\n--b--"));
    }

    #[test]
    fn unconfigured_client_is_refused() {
        let mut config = AppConfig::for_tests().google_drive;
        config.access_token = None;
        config.client_email = None;
        assert!(matches!(GoogleDriveClient::new(config), Err(DriveError::NotConfigured)));
    }

    #[test]
    fn view_url_falls_back_to_file_link() {
        let file: DriveFile = serde_json::from_value(json!({"id": "abc"})).unwrap();
        assert_eq!(file.view_url(), "https://drive.google.com/file/d/abc/view");
    }
}
