//! Exchange of upstream Supabase session tokens for service tokens.

use jsonwebtoken::{decode, Algorithm, Validation};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::claims::{TokenPair, TokenSubject};
use super::service::JwtService;
use super::JwtError;
use crate::database::models::Profile;
use crate::types::UserRole;

const SUPABASE_AUDIENCE: &str = "authenticated";

/// Subset of the claims Supabase Auth puts in its access tokens
#[derive(Debug, Clone, Deserialize)]
pub struct SupabaseClaims {
    pub sub: Uuid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub exp: i64,
}

impl JwtService {
    pub fn verify_supabase_token(&self, token: &str) -> Result<SupabaseClaims, JwtError> {
        let key = self.supabase_key.as_ref().ok_or(JwtError::SupabaseNotConfigured)?;

        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&[SUPABASE_AUDIENCE]);
        let data = decode::<SupabaseClaims>(token, key, &validation)?;
        Ok(data.claims)
    }

    /// Verify a Supabase session token and issue a service token pair for its
    /// user. First sign-in creates a plain `user` profile.
    pub async fn exchange_supabase_token(&self, token: &str) -> Result<(Profile, TokenPair), JwtError> {
        let upstream = self.verify_supabase_token(token)?;

        let profile = match self.store.get_profile(upstream.sub).await? {
            Some(profile) => profile,
            None => {
                let mut profile = Profile::new(
                    upstream.sub,
                    upstream.email.clone().unwrap_or_default(),
                    UserRole::User.as_str(),
                );
                profile.phone_number = upstream.phone.clone().filter(|phone| !phone.is_empty());
                let profile = self.store.create_profile(profile).await?;
                info!("Created profile for first sign-in of {}", profile.id);
                profile
            }
        };

        let pair = self.create_token_pair(&TokenSubject::from(&profile)).await?;
        Ok((profile, pair))
    }
}
