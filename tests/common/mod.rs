#![allow(dead_code)]

use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use jsonwebtoken::{encode, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{json, Value};
use uuid::Uuid;

pub const SUPABASE_SECRET: &str = "integration-supabase-secret";

static SERVER: OnceLock<TestServer> = OnceLock::new();

pub struct TestServer {
    pub port: u16,
    pub base_url: String,
    child: Child,
}

impl TestServer {
    fn spawn() -> Result<Self> {
        // Pick an unused port for isolation
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        // Memory store and no third-party credentials; empty values win over .env
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_buffrlend-api"));
        cmd.env("BUFFRLEND_API_PORT", port.to_string())
            .env("BUFFRLEND_STORE", "memory")
            .env("JWT_SECRET", "integration-jwt-secret")
            .env("SUPABASE_JWT_SECRET", SUPABASE_SECRET)
            .env("API_ENABLE_RATE_LIMITING", "false")
            .env("GOOGLE_DRIVE_ACCESS_TOKEN", "")
            .env("GOOGLE_DRIVE_CLIENT_EMAIL", "")
            .env("TWILIO_ACCOUNT_SID", "")
            .env("TWILIO_AUTH_TOKEN", "")
            .env("RUST_LOG", "warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let child = cmd.spawn().context("failed to spawn server binary")?;

        Ok(Self { port, base_url, child })
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            let url = format!("{}/health", self.base_url);
            if let Ok(resp) = client.get(&url).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(150)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

pub async fn ensure_server() -> Result<&'static TestServer> {
    let server = SERVER.get_or_init(|| TestServer::spawn().expect("failed to spawn server binary"));
    server.wait_ready(Duration::from_secs(10)).await?;
    Ok(server)
}

/// Supabase-style session token the server accepts at `/auth/session`
pub fn supabase_token(sub: Uuid, email: &str) -> Result<String> {
    let claims = json!({
        "sub": sub,
        "email": email,
        "aud": "authenticated",
        "exp": chrono::Utc::now().timestamp() + 600
    });
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(SUPABASE_SECRET.as_bytes()))?)
}

/// Exchange a fresh Supabase token and return the session payload
pub async fn new_session(server: &TestServer) -> Result<Value> {
    let email = format!("{}@example.com", Uuid::new_v4().simple());
    let token = supabase_token(Uuid::new_v4(), &email)?;

    let res = reqwest::Client::new()
        .post(server.url("/auth/session"))
        .json(&json!({ "access_token": token }))
        .send()
        .await?;
    anyhow::ensure!(res.status() == StatusCode::OK, "session exchange failed: {}", res.status());
    let body: Value = res.json().await?;
    Ok(body["data"].clone())
}
