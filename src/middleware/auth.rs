use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Claims;
use crate::error::ApiError;
use crate::types::{TokenType, UserRole};

/// Authenticated user context extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub jti: Uuid,
    /// The raw bearer token, kept for logout
    pub token: String,
}

impl AuthUser {
    fn from_claims(claims: Claims, token: String) -> Self {
        Self {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
            permissions: claims.permissions,
            jti: claims.jti,
            token,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin.as_str()
    }

    /// Role matches, or the caller is an admin
    pub fn has_role(&self, role: UserRole) -> bool {
        self.is_admin() || self.role == role.as_str()
    }

    /// Admins hold every permission; everyone else needs each one listed
    pub fn has_permissions(&self, required: &[&str]) -> bool {
        self.is_admin() || required.iter().all(|p| self.permissions.iter().any(|held| held == p))
    }

    pub fn require_role(&self, role: UserRole) -> Result<(), ApiError> {
        if self.has_role(role) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Insufficient role"))
        }
    }

    pub fn require_permissions(&self, required: &[&str]) -> Result<(), ApiError> {
        if self.has_permissions(required) {
            Ok(())
        } else {
            Err(ApiError::forbidden("Insufficient permissions"))
        }
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Admin access required"))
        }
    }
}

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = match extract_token(request.headers(), request.uri().query()) {
        Some(token) => token,
        None => return ApiError::unauthorized("No token provided").into_response(),
    };

    let claims = match state.jwt.verify_token(&token, TokenType::Access).await {
        Ok(claims) => claims,
        Err(err) => {
            tracing::debug!("Rejected access token: {}", err);
            return ApiError::unauthorized("Invalid token").into_response();
        }
    };

    let auth_user = AuthUser::from_claims(claims, token);
    if state.config.api.enable_request_logging {
        tracing::info!(
            method = %request.method(),
            path = %request.uri().path(),
            user_id = %auth_user.user_id,
            role = %auth_user.role,
            client = %client_address(request.headers()),
            "Authenticated request"
        );
    }

    request.extensions_mut().insert(auth_user);
    next.run(request).await
}

/// Bearer header first, then the `access_token` cookie, then `?token=`
pub fn extract_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Some(token.to_string());
    }

    if let Some(token) = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == "access_token" && !value.is_empty())
        .map(|(_, value)| value.to_string())
    {
        return Some(token);
    }

    query.and_then(|query| {
        url::form_urlencoded::parse(query.as_bytes())
            .find(|(name, value)| name == "token" && !value.is_empty())
            .map(|(_, value)| value.into_owned())
    })
}

/// First `x-forwarded-for` hop, else `unknown`
pub fn client_address(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .unwrap_or("unknown")
        .to_string()
}
