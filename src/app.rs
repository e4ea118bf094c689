//! Shared application state and router assembly.

use axum::{extract::DefaultBodyLimit, http::HeaderValue, middleware, Router};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::{JwtError, JwtService};
use crate::config::{AppConfig, GoogleDriveConfig};
use crate::database::Store;
use crate::handlers;
use crate::integrations::{DocumentStorage, MessageSender};
use crate::middleware::{jwt_auth_middleware, rate_limit_middleware, with_security_headers, RateLimiter};
use crate::services::{CrmService, DocumentService, LoanService, WhatsAppService};

/// Everything a handler needs, cloned per request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub jwt: Arc<JwtService>,
    /// `None` when Google Drive credentials are missing
    pub drive: Option<Arc<dyn DocumentStorage>>,
    /// `None` when Twilio credentials are missing
    pub messenger: Option<Arc<dyn MessageSender>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub upload_limiter: Arc<RateLimiter>,
    drive_config: Arc<GoogleDriveConfig>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn Store>,
        drive: Option<Arc<dyn DocumentStorage>>,
        messenger: Option<Arc<dyn MessageSender>>,
    ) -> Result<Self, JwtError> {
        let jwt = JwtService::new(&config.security, store.clone())?;
        let window = Duration::from_secs(config.api.rate_limit_window_secs);

        Ok(Self {
            rate_limiter: Arc::new(RateLimiter::new(config.api.rate_limit_requests, window)),
            upload_limiter: Arc::new(RateLimiter::new(config.api.upload_rate_limit_requests, window)),
            drive_config: Arc::new(config.google_drive.clone()),
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            store,
            drive,
            messenger,
        })
    }

    pub fn whatsapp(&self) -> WhatsAppService {
        WhatsAppService::new(self.store.clone(), self.messenger.clone())
    }

    pub fn documents(&self) -> DocumentService {
        DocumentService::new(
            self.store.clone(),
            self.drive.clone(),
            self.drive_config.clone(),
            self.whatsapp(),
            self.config.whatsapp.admin_number.clone(),
        )
    }

    pub fn loans(&self) -> LoanService {
        LoanService::new(self.store.clone())
    }

    pub fn crm(&self) -> CrmService {
        CrmService::new(self.store.clone())
    }
}

/// Runs the CRM automation pass now and then every 24 hours until the runtime stops
pub fn spawn_daily_automation(state: &AppState) -> tokio::task::JoinHandle<()> {
    let crm = state.crm();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(24 * 60 * 60));
        loop {
            ticker.tick().await;
            if let Err(e) = crm.run_daily_automation(chrono::Utc::now()).await {
                tracing::error!("Daily CRM automation failed: {}", e);
            }
        }
    })
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    if config.security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = config
        .security
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::permissive().allow_origin(origins)
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(handlers::auth::protected_routes())
        .merge(handlers::loans::routes())
        .merge(handlers::documents::routes(state.clone()))
        .merge(handlers::crm::routes())
        .merge(handlers::whatsapp::protected_routes())
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_auth_middleware));

    let public = Router::new()
        .merge(handlers::health::routes())
        .merge(handlers::auth::public_routes())
        .merge(handlers::calculator::routes())
        .merge(handlers::whatsapp::public_routes());

    let mut app = Router::new().merge(public).merge(protected);
    if state.config.api.enable_rate_limiting {
        app = app.layer(middleware::from_fn_with_state(state.clone(), rate_limit_middleware));
    }

    with_security_headers(app)
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes))
        .layer(cors_layer(&state.config))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
