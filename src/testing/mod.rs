//! In-process fakes and a router harness for unit tests.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tower::ServiceExt;
use uuid::Uuid;

use crate::app::{router, AppState};
use crate::auth::TokenSubject;
use crate::config::AppConfig;
use crate::database::models::Profile;
use crate::database::{MemoryStore, ProfileStore};
use crate::integrations::google_drive::{DocumentStorage, DriveError, DriveFile};
use crate::integrations::twilio::{MessageSender, MessagingError, SentMessage};
use crate::types::{TokenType, UserRole};

/// Message sender that keeps every delivery in memory
#[derive(Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<(String, String)>>,
    counter: AtomicUsize,
}

impl RecordingSender {
    /// `(to, body)` pairs in send order
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl MessageSender for RecordingSender {
    async fn send(&self, to: &str, body: &str) -> Result<SentMessage, MessagingError> {
        self.sent.lock().await.push((to.to_string(), body.to_string()));
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SentMessage {
            sid: format!("SM{:032}", n),
            status: Some("queued".to_string()),
        })
    }

    fn from_number(&self) -> &str {
        "whatsapp:+14155238886"
    }
}

/// Drive stand-in keeping file metadata and parent folder in memory
#[derive(Default)]
pub struct FakeDrive {
    files: Mutex<HashMap<String, DriveFile>>,
    counter: AtomicUsize,
    failing: AtomicBool,
    offline: AtomicBool,
}

impl FakeDrive {
    pub async fn folder_of(&self, file_id: &str) -> Option<String> {
        self.files
            .lock()
            .await
            .get(file_id)
            .and_then(|f| f.parents.first().cloned())
    }

    pub async fn file_count(&self) -> usize {
        self.files.lock().await.len()
    }

    pub async fn remove(&self, file_id: &str) {
        self.files.lock().await.remove(file_id);
    }

    /// Every later upload fails with an API error
    pub fn fail_uploads(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    /// Connection checks report an auth failure
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl DocumentStorage for FakeDrive {
    async fn upload(
        &self,
        file_name: &str,
        mime_type: &str,
        content: Vec<u8>,
        folder_id: &str,
    ) -> Result<DriveFile, DriveError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DriveError::Api {
                status: 500,
                message: "backendError".to_string(),
            });
        }
        let id = format!("drive-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        let file = DriveFile {
            id: id.clone(),
            name: file_name.to_string(),
            mime_type: Some(mime_type.to_string()),
            size: Some(content.len().to_string()),
            created_time: None,
            web_view_link: Some(format!("https://drive.google.com/file/d/{}/view", id)),
            parents: vec![folder_id.to_string()],
        };
        self.files.lock().await.insert(id, file.clone());
        Ok(file)
    }

    async fn get_file(&self, file_id: &str) -> Result<DriveFile, DriveError> {
        self.files
            .lock()
            .await
            .get(file_id)
            .cloned()
            .ok_or_else(|| DriveError::NotFound(file_id.to_string()))
    }

    async fn move_to_folder(&self, file_id: &str, folder_id: &str) -> Result<DriveFile, DriveError> {
        let mut files = self.files.lock().await;
        let file = files
            .get_mut(file_id)
            .ok_or_else(|| DriveError::NotFound(file_id.to_string()))?;
        file.parents = vec![folder_id.to_string()];
        Ok(file.clone())
    }

    async fn delete(&self, file_id: &str) -> Result<(), DriveError> {
        self.files
            .lock()
            .await
            .remove(file_id)
            .map(|_| ())
            .ok_or_else(|| DriveError::NotFound(file_id.to_string()))
    }

    async fn test_connection(&self) -> Result<Value, DriveError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(DriveError::Api {
                status: 401,
                message: "invalid_grant".to_string(),
            });
        }
        Ok(serde_json::json!({ "user": { "emailAddress": "fake-drive@example.com" } }))
    }
}

/// Full router over the memory store, fake Drive and recording sender
pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryStore>,
    pub drive: Arc<FakeDrive>,
    pub sender: Arc<RecordingSender>,
}

impl TestApp {
    pub fn new() -> Self {
        let mut config = AppConfig::for_tests();
        config.api.enable_rate_limiting = false;
        Self::with_config(config)
    }

    pub fn with_config(config: AppConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let drive = Arc::new(FakeDrive::default());
        let sender = Arc::new(RecordingSender::default());
        let state = AppState::new(config, store.clone(), Some(drive.clone()), Some(sender.clone()))
            .expect("test config has a JWT secret");
        Self {
            state,
            store,
            drive,
            sender,
        }
    }

    /// Same store and fakes, but no Drive client configured
    pub fn without_drive(mut self) -> Self {
        self.state.drive = None;
        self
    }

    pub fn router(&self) -> Router {
        router(self.state.clone())
    }

    /// Stores a profile with the given role and returns it with an access token
    pub async fn user(&self, role: UserRole) -> (Profile, String) {
        self.user_with_permissions(role, &[]).await
    }

    pub async fn user_with_permissions(&self, role: UserRole, permissions: &[&str]) -> (Profile, String) {
        let mut profile = Profile::new(Uuid::new_v4(), format!("{}@example.com", role), role.as_str());
        profile.phone_number = Some("+264812222222".to_string());
        profile.permissions = permissions.iter().map(|p| p.to_string()).collect();
        self.store.create_profile(profile.clone()).await.unwrap();
        let token = self
            .state
            .jwt
            .create_token(&TokenSubject::from(&profile), TokenType::Access)
            .await
            .unwrap();
        (profile, token)
    }

    pub async fn call(&self, request: Request<Body>) -> (StatusCode, HeaderMap, Value) {
        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
        };
        (status, headers, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let (status, _, body) = self.call(request(Method::GET, uri, token, None)).await;
        (status, body)
    }

    pub async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let (status, _, body) = self.call(request(Method::POST, uri, token, Some(body))).await;
        (status, body)
    }

    pub async fn patch(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        let (status, _, body) = self.call(request(Method::PATCH, uri, token, Some(body))).await;
        (status, body)
    }
}

pub fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// `multipart/form-data` body from text fields plus one optional file part
pub fn multipart_request(
    uri: &str,
    token: Option<&str>,
    fields: &[(&str, &str)],
    file: Option<(&str, &str, &[u8])>,
) -> Request<Body> {
    let boundary = "buffrlend-test-boundary";
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            )
            .as_bytes(),
        );
    }
    if let Some((file_name, mime_type, content)) = file {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                boundary, file_name, mime_type
            )
            .as_bytes(),
        );
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());

    let mut builder = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary));
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::from(body)).unwrap()
}
