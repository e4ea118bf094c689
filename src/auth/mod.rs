pub mod claims;
pub mod service;
pub mod supabase;

use thiserror::Error;

use crate::database::DatabaseError;
use crate::types::TokenType;

pub use claims::{Claims, TokenPair, TokenSubject};
pub use service::JwtService;

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("Invalid JWT secret")]
    InvalidSecret,

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("Invalid JWT token: {0}")]
    Invalid(String),

    #[error("Token has expired")]
    Expired,

    #[error("Expected {expected} token, got {found}")]
    WrongTokenType { expected: TokenType, found: TokenType },

    #[error("Token has been revoked")]
    Revoked,

    #[error("Token has been blacklisted")]
    Blacklisted,

    #[error("Supabase authentication is not configured")]
    SupabaseNotConfigured,

    #[error("User profile not found")]
    ProfileNotFound,

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
            _ => JwtError::Invalid(err.to_string()),
        }
    }
}
