// handlers/auth/session.rs - /auth/session, /auth/refresh, whoami and logout

use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    Extension, Json,
};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::auth::TokenPair;
use crate::database::models::Profile;
use crate::error::ApiError;
use crate::middleware::{auth::extract_token, ApiResponse, ApiResult, AuthUser};

#[derive(Debug, Default, Deserialize)]
pub struct SessionRequest {
    /// Supabase access token; the Authorization header is used when absent
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Session {
    pub user: Profile,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

/// POST /auth/session - exchange a Supabase session token for a service token pair
///
/// Expected Output:
/// ```json
/// {
///   "success": true,
///   "data": {
///     "user": { "id": "...", "email": "...", "role": "user" },
///     "access_token": "eyJ...",
///     "refresh_token": "eyJ...",
///     "expires_in": 900,
///     "token_type": "Bearer"
///   }
/// }
/// ```
pub async fn exchange(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Option<Json<SessionRequest>>,
) -> ApiResult<Session> {
    let request = body.map(|Json(request)| request).unwrap_or_default();
    let token = request
        .access_token
        .filter(|token| !token.is_empty())
        .or_else(|| extract_token(&headers, None))
        .ok_or_else(|| ApiError::unauthorized("No token provided"))?;

    let (user, tokens) = state.jwt.exchange_supabase_token(&token).await?;
    tracing::info!("Issued session for {}", user.id);
    Ok(ApiResponse::success(Session { user, tokens }))
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// POST /auth/refresh - rotate a refresh token
pub async fn refresh(
    State(state): State<AppState>,
    body: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<TokenPair> {
    let Json(request) = body?;
    if request.refresh_token.is_empty() {
        return Err(ApiError::bad_request("Refresh token is required"));
    }
    let pair = state.jwt.refresh_access_token(&request.refresh_token).await?;
    Ok(ApiResponse::success(pair))
}

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub id: uuid::Uuid,
    pub email: String,
    pub role: String,
    pub permissions: Vec<String>,
    pub profile: Option<Profile>,
}

/// GET /api/auth/whoami - claims of the presented token plus the stored profile
pub async fn whoami(State(state): State<AppState>, Extension(user): Extension<AuthUser>) -> ApiResult<WhoAmI> {
    let profile = state.store.get_profile(user.user_id).await?;
    Ok(ApiResponse::success(WhoAmI {
        id: user.user_id,
        email: user.email,
        role: user.role,
        permissions: user.permissions,
        profile,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    /// Also blacklisted when supplied
    pub refresh_token: Option<String>,
}

/// POST /api/auth/logout - blacklist the presented access token
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    body: Option<Json<LogoutRequest>>,
) -> ApiResult<serde_json::Value> {
    state.jwt.blacklist_token(&user.token).await?;

    if let Some(refresh) = body.and_then(|Json(request)| request.refresh_token) {
        let claims = state.jwt.blacklist_token(&refresh).await?;
        if claims.sub != user.user_id {
            tracing::warn!("User {} logged out a refresh token owned by {}", user.user_id, claims.sub);
        }
    }

    Ok(ApiResponse::success(serde_json::json!({ "logged_out": true })).with_message("Logged out successfully"))
}

#[cfg(test)]
mod tests {
    use crate::testing::TestApp;
    use crate::types::UserRole;
    use axum::http::StatusCode;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;
    use uuid::Uuid;

    fn supabase_token(sub: Uuid) -> String {
        let claims = json!({
            "sub": sub,
            "email": "new@example.com",
            "phone": "+264813333333",
            "aud": "authenticated",
            "exp": Utc::now().timestamp() + 600
        });
        encode(&Header::default(), &claims, &EncodingKey::from_secret(b"supabase-test-secret")).unwrap()
    }

    #[tokio::test]
    async fn exchange_issues_pair_and_creates_profile() {
        let app = TestApp::new();
        let sub = Uuid::new_v4();
        let (status, body) = app
            .post("/auth/session", None, json!({ "access_token": supabase_token(sub) }))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["user"]["id"], sub.to_string());
        assert_eq!(body["data"]["token_type"], "Bearer");

        let access = body["data"]["access_token"].as_str().unwrap();
        let (status, me) = app.get("/api/auth/whoami", Some(access)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(me["data"]["email"], "new@example.com");
    }

    #[tokio::test]
    async fn exchange_without_token_is_unauthorized() {
        let app = TestApp::new();
        let (status, body) = app.post("/auth/session", None, json!({})).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "No token provided");
    }

    #[tokio::test]
    async fn protected_routes_require_token() {
        let app = TestApp::new();
        let (status, body) = app.get("/api/auth/whoami", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "No token provided");

        let (status, body) = app.get("/api/auth/whoami", Some("not-a-jwt")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "Invalid token");
    }

    #[tokio::test]
    async fn logout_blacklists_the_token() {
        let app = TestApp::new();
        let (_, token) = app.user(UserRole::User).await;

        let (status, _) = app.post("/api/auth/logout", Some(&token), json!({})).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.get("/api/auth/whoami", Some(&token)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn refresh_rotates_tokens() {
        let app = TestApp::new();
        let sub = Uuid::new_v4();
        let (_, session) = app
            .post("/auth/session", None, json!({ "access_token": supabase_token(sub) }))
            .await;
        let refresh = session["data"]["refresh_token"].as_str().unwrap().to_string();

        let (status, body) = app.post("/auth/refresh", None, json!({ "refresh_token": refresh })).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["access_token"].is_string());

        let (status, _) = app.post("/auth/refresh", None, json!({ "refresh_token": refresh })).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
