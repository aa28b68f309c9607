//! Authentication: token endpoints and bearer middleware
//!
//! POST /auth/login, POST /auth/refresh, GET /auth/user

use axum::{
    extract::{rejection::JsonRejection, Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use vigil_common::api::{issue_token, verify_password, verify_token, ApiAuthError, TokenClaims, TokenKind};

use crate::db;
use crate::error::{ApiError, ApiResult};
use crate::models::UserProfile;
use crate::AppState;

/// The authenticated caller, inserted into request extensions by [`require_auth`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
}

/// POST /auth/login request
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// POST /auth/login response
#[derive(Debug, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// POST /auth/refresh request
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: Option<String>,
}

/// POST /auth/refresh response
#[derive(Debug, Serialize)]
pub struct AccessToken {
    pub access: String,
}

/// POST /auth/login
pub async fn login(
    State(state): State<AppState>,
    request: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Json<TokenPair>> {
    let Json(request) = request?;
    let username = required(request.username, "username")?;
    let password = required(request.password, "password")?;

    let user = db::users::find_by_username(&state.db, &username).await?;
    let user = match user {
        Some(user) if verify_password(&password, &user.password_hash) => user,
        _ => {
            warn!(username = %username, "Login failed");
            return Err(ApiError::Unauthorized(
                "No active account found with the given credentials".to_string(),
            ));
        }
    };

    info!(user_id = user.id, "User logged in");

    Ok(Json(TokenPair {
        access: sign(&state, user.id, TokenKind::Access)?,
        refresh: sign(&state, user.id, TokenKind::Refresh)?,
    }))
}

/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    request: Result<Json<RefreshRequest>, JsonRejection>,
) -> ApiResult<Json<AccessToken>> {
    let Json(request) = request?;
    let token = required(request.refresh, "refresh")?;

    let claims = verify_token(&token, &state.tokens.secret, TokenKind::Refresh)
        .map_err(unauthorized)?;

    if db::users::find_by_id(&state.db, claims.sub).await?.is_none() {
        return Err(ApiError::Unauthorized("User not found".to_string()));
    }

    Ok(Json(AccessToken {
        access: sign(&state, claims.sub, TokenKind::Access)?,
    }))
}

/// GET /auth/user
pub async fn current_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> ApiResult<Json<UserProfile>> {
    let user = db::users::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    Ok(Json(UserProfile::from(user)))
}

/// Bearer authentication middleware
///
/// Applied to protected routes only; /health and /ws/notifications are not
/// behind it.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Authentication credentials were not provided".to_string()))?;

    let user = authenticate(&state, token).await?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Verify an access token and confirm its user still exists
pub async fn authenticate(state: &AppState, token: &str) -> ApiResult<AuthUser> {
    let claims = verify_token(token, &state.tokens.secret, TokenKind::Access).map_err(unauthorized)?;

    if db::users::find_by_id(&state.db, claims.sub).await?.is_none() {
        return Err(ApiError::Unauthorized("User not found".to_string()));
    }

    Ok(AuthUser { id: claims.sub })
}

/// Token from an `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

fn sign(state: &AppState, user_id: i64, kind: TokenKind) -> ApiResult<String> {
    let lifetime = match kind {
        TokenKind::Access => state.tokens.access_lifetime,
        TokenKind::Refresh => state.tokens.refresh_lifetime,
    };
    issue_token(&TokenClaims::new(user_id, kind, lifetime), &state.tokens.secret)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

fn unauthorized(err: ApiAuthError) -> ApiError {
    match err {
        ApiAuthError::DatabaseError(msg) | ApiAuthError::Signing(msg) => ApiError::Internal(msg),
        other => {
            debug!(error = %other, "Token rejected");
            ApiError::Unauthorized("Given token not valid".to_string())
        }
    }
}

pub(crate) fn required(value: Option<String>, field: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{} is required", field)))
}

/// Public token routes
pub fn token_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh))
}

/// Routes that need an authenticated caller
pub fn user_routes() -> Router<AppState> {
    Router::new().route("/auth/user", get(current_user))
}
