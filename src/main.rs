use std::sync::Arc;

use buffrlend_api::app::{self, AppState};
use buffrlend_api::config::{self, StoreBackend};
use buffrlend_api::database::DatabaseManager;
use buffrlend_api::integrations::{DocumentStorage, GoogleDriveClient, MessageSender, TwilioClient};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, JWT_SECRET, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = config::config();
    tracing::info!("Starting BuffrLend API in {:?} mode", config.environment);

    if config.database.backend == StoreBackend::Postgres && config.database.run_migrations {
        let pool = DatabaseManager::connect_lazy(&config.database)?;
        DatabaseManager::migrate(&pool).await?;
    }
    let store = DatabaseManager::open_store(&config.database)?;

    let drive: Option<Arc<dyn DocumentStorage>> = match GoogleDriveClient::new(config.google_drive.clone()) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("Google Drive disabled: {}", e);
            None
        }
    };
    let messenger: Option<Arc<dyn MessageSender>> = match TwilioClient::new(&config.whatsapp) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("WhatsApp disabled: {}", e);
            None
        }
    };

    let state = AppState::new(config.clone(), store, drive, messenger)?;
    if config.api.enable_crm_automation {
        let _automation = app::spawn_daily_automation(&state);
    }

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("BuffrLend API listening on http://{}", bind_addr);

    axum::serve(listener, app::router(state)).await?;
    Ok(())
}
