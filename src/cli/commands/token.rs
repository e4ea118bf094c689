use clap::Args;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{JwtService, TokenSubject};
use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::config::config;
use crate::database::MemoryStore;
use crate::types::{TokenType, UserRole};

#[derive(Args)]
pub struct TokenArgs {
    #[arg(long, help = "Subject user id (random when omitted)")]
    pub user_id: Option<Uuid>,

    #[arg(long, help = "E-mail claim")]
    pub email: String,

    #[arg(long, default_value = "user", help = "Role claim: user, admin or partner")]
    pub role: String,

    #[arg(long = "permission", help = "Permission claim, repeatable")]
    pub permissions: Vec<String>,
}

/// Signs an access token locally. Nothing is written to the database, so the
/// token is only useful against a server sharing the same JWT_SECRET.
pub async fn handle(args: TokenArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let role: UserRole = args.role.parse()?;
    let subject = TokenSubject {
        user_id: args.user_id.unwrap_or_else(Uuid::new_v4),
        email: args.email,
        role: role.to_string(),
        permissions: args.permissions,
    };

    let jwt = JwtService::new(&config().security, Arc::new(MemoryStore::new()))?;
    let token = jwt.create_token(&subject, TokenType::Access).await?;

    match output_format {
        OutputFormat::Text => println!("{}", token),
        OutputFormat::Json => output_success(
            &output_format,
            "Access token issued",
            Some(json!({
                "access_token": token,
                "user_id": subject.user_id,
                "expires_in": jwt.access_expiry_secs(),
            })),
        )?,
    }
    Ok(())
}
