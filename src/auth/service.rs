use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::claims::{Claims, TokenPair, TokenSubject};
use super::JwtError;
use crate::config::SecurityConfig;
use crate::database::Store;
use crate::types::TokenType;

/// Issues and validates HS256 tokens, backed by the blacklist and
/// refresh-token tables.
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    pub(super) supabase_key: Option<DecodingKey>,
    issuer: String,
    access_ttl: Duration,
    refresh_ttl: Duration,
    pub(super) store: Arc<dyn Store>,
}

impl JwtService {
    pub fn new(security: &SecurityConfig, store: Arc<dyn Store>) -> Result<Self, JwtError> {
        if security.jwt_secret.is_empty() {
            return Err(JwtError::InvalidSecret);
        }

        let supabase_key = if security.supabase_jwt_secret.is_empty() {
            None
        } else {
            Some(DecodingKey::from_secret(security.supabase_jwt_secret.as_bytes()))
        };

        Ok(Self {
            encoding_key: EncodingKey::from_secret(security.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(security.jwt_secret.as_bytes()),
            supabase_key,
            issuer: security.jwt_issuer.clone(),
            access_ttl: Duration::seconds(security.access_token_expiry_secs),
            refresh_ttl: Duration::seconds(security.refresh_token_expiry_secs),
            store,
        })
    }

    /// Access token lifetime in seconds
    pub fn access_expiry_secs(&self) -> i64 {
        self.access_ttl.num_seconds()
    }

    /// Sign a token of the given type. Refresh tokens are recorded so they
    /// can be rotated and revoked.
    pub async fn create_token(&self, subject: &TokenSubject, token_type: TokenType) -> Result<String, JwtError> {
        let ttl = match token_type {
            TokenType::Access => self.access_ttl,
            TokenType::Refresh => self.refresh_ttl,
        };
        let claims = Claims::new(subject, token_type, &self.issuer, ttl);
        let token = self.sign(&claims)?;

        if token_type == TokenType::Refresh {
            self.store
                .record_refresh_token(claims.jti, claims.sub, timestamp(claims.exp))
                .await?;
        }
        Ok(token)
    }

    pub async fn create_token_pair(&self, subject: &TokenSubject) -> Result<TokenPair, JwtError> {
        let access_token = self.create_token(subject, TokenType::Access).await?;
        let refresh_token = self.create_token(subject, TokenType::Refresh).await?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            expires_in: self.access_expiry_secs(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Full verification: signature, expiry, issuer, token type and blacklist
    pub async fn verify_token(&self, token: &str, expected: TokenType) -> Result<Claims, JwtError> {
        let claims = self.decode_claims(token, true)?;

        if claims.token_type != expected {
            return Err(JwtError::WrongTokenType {
                expected,
                found: claims.token_type,
            });
        }
        if self.store.is_blacklisted(claims.jti).await? {
            return Err(JwtError::Blacklisted);
        }
        Ok(claims)
    }

    /// Subject of a correctly signed token, ignoring expiry and revocation.
    /// Used to key rate limits without touching the store.
    pub fn peek_subject(&self, token: &str) -> Option<Uuid> {
        self.decode_claims(token, false).ok().map(|claims| claims.sub)
    }

    /// Rotate a refresh token: the presented token is revoked and a new pair
    /// is issued from the current profile.
    pub async fn refresh_access_token(&self, refresh_token: &str) -> Result<TokenPair, JwtError> {
        let claims = self.verify_token(refresh_token, TokenType::Refresh).await?;

        match self.store.get_refresh_token(claims.jti).await? {
            Some(record) if !record.revoked => {}
            _ => return Err(JwtError::Revoked),
        }

        // Role and permissions may have changed since the token was issued
        let profile = self
            .store
            .get_profile(claims.sub)
            .await?
            .ok_or(JwtError::ProfileNotFound)?;

        if !self.store.revoke_refresh_token(claims.jti).await? {
            // Lost a race with a concurrent refresh of the same token
            return Err(JwtError::Revoked);
        }

        debug!("Rotated refresh token {} for {}", claims.jti, claims.sub);
        self.create_token_pair(&TokenSubject::from(&profile)).await
    }

    /// Blacklist a token until its natural expiry. Expired tokens are still
    /// accepted here; bad signatures are not.
    pub async fn blacklist_token(&self, token: &str) -> Result<Claims, JwtError> {
        let claims = self.decode_claims(token, false)?;
        self.store
            .blacklist_token(claims.jti, claims.sub, timestamp(claims.exp))
            .await?;
        if claims.token_type == TokenType::Refresh {
            self.store.revoke_refresh_token(claims.jti).await?;
        }
        info!("Blacklisted {} token {} for {}", claims.token_type, claims.jti, claims.sub);
        Ok(claims)
    }

    pub async fn revoke_all_user_tokens(&self, user_id: Uuid) -> Result<u64, JwtError> {
        let revoked = self.store.revoke_user_refresh_tokens(user_id).await?;
        info!("Revoked {} refresh tokens for {}", revoked, user_id);
        Ok(revoked)
    }

    pub async fn cleanup_expired_tokens(&self) -> Result<u64, JwtError> {
        let removed = self.store.purge_expired_tokens(Utc::now()).await?;
        info!("Removed {} expired token rows", removed);
        Ok(removed)
    }

    fn sign(&self, claims: &Claims) -> Result<String, JwtError> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| JwtError::TokenGeneration(e.to_string()))
    }

    fn decode_claims(&self, token: &str, validate_exp: bool) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_exp = validate_exp;
        if !validate_exp {
            validation.required_spec_claims.remove("exp");
        }
        let data = decode::<Claims>(token, &self.decoding_key, &validation)?;
        Ok(data.claims)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_else(Utc::now)
}
