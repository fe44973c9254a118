//! Authentication API handlers
//!
//! Login (form and JSON), registration, token refresh and logout. All of
//! these sit under `/api/v1/auth` and bypass the request gate.

use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::auth::{
    AuthResponse, LoginForm, LoginOutcome, LoginRequest, LogoutRequest, MessageResponse,
    RefreshRequest, TokenPair,
};
use crate::error::AppError;
use crate::extractors::{ApiForm, ApiJson};
use crate::state::AppState;
use crate::users::{UserCreate, UserPublic};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use roster_core::normalize_identifier;
use std::sync::Arc;
use validator::Validate;

async fn login_audited(
    state: &AppState,
    headers: &HeaderMap,
    login: &str,
    password: &str,
) -> Result<LoginOutcome, AppError> {
    match state.auth.login(login, password).await {
        Ok(outcome) => {
            audit_log(&AuditEvent::LoginSuccess {
                user_id: outcome.user.id,
                username: outcome.user.username.clone(),
                ip_address: extract_ip_address(headers),
                user_agent: extract_user_agent(headers),
            });
            Ok(outcome)
        }
        Err(e) => {
            audit_log(&AuditEvent::LoginFailure {
                login: normalize_identifier(login),
                reason: e.code().to_string(),
                ip_address: extract_ip_address(headers),
                user_agent: extract_user_agent(headers),
            });
            Err(e.into())
        }
    }
}

/// Login with an OAuth2 password form
///
/// The `username` field may hold a username or an e-mail address.
#[utoipa::path(
    post,
    path = "/api/v1/auth/login",
    tag = "auth",
    request_body(content = LoginForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Login successful", body = TokenPair),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiForm(form): ApiForm<LoginForm>,
) -> Result<Json<TokenPair>, AppError> {
    form.validate()?;
    let outcome = login_audited(&state, &headers, &form.username, &form.password).await?;
    Ok(Json(outcome.tokens))
}

/// Login with a JSON body; returns the user alongside the tokens
#[utoipa::path(
    post,
    path = "/api/v1/auth/login_json",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn login_json_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    request.validate()?;
    let outcome = login_audited(&state, &headers, &request.login, &request.password).await?;

    Ok(Json(AuthResponse {
        user: UserPublic::from(outcome.user),
        tokens: outcome.tokens,
        issued_at: outcome.issued_at,
    }))
}

/// Register a new user account
#[utoipa::path(
    post,
    path = "/api/v1/auth/register",
    tag = "auth",
    request_body = UserCreate,
    responses(
        (status = 201, description = "User registered", body = UserPublic),
        (status = 409, description = "Username or e-mail taken", body = crate::error::ApiError),
        (status = 422, description = "Invalid input", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<UserCreate>,
) -> Result<impl IntoResponse, AppError> {
    let username = normalize_identifier(&request.username);

    match state.users.create(request).await {
        Ok(user) => {
            audit_log(&AuditEvent::RegistrationSuccess {
                user_id: user.id,
                username: user.username.clone(),
                ip_address: extract_ip_address(&headers),
            });
            Ok((StatusCode::CREATED, Json(UserPublic::from(user))))
        }
        Err(e) => {
            audit_log(&AuditEvent::RegistrationFailure {
                username,
                reason: e.to_string(),
                ip_address: extract_ip_address(&headers),
            });
            Err(e.into())
        }
    }
}

/// Exchange a refresh token for a new token pair
#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New tokens issued", body = TokenPair),
        (status = 401, description = "Expired, invalid or revoked refresh token", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<RefreshRequest>,
) -> Result<Json<TokenPair>, AppError> {
    match state.auth.refresh(&request.refresh_token).await {
        Ok(rotation) => {
            audit_log(&AuditEvent::TokenRefresh {
                subject: rotation.subject,
                ip_address: extract_ip_address(&headers),
            });
            Ok(Json(rotation.tokens))
        }
        Err(e) => {
            audit_log(&AuditEvent::TokenRefreshFailure {
                reason: e.code().to_string(),
                ip_address: extract_ip_address(&headers),
            });
            Err(e.into())
        }
    }
}

/// Revoke a refresh token
#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    tag = "auth",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Refresh token revoked", body = MessageResponse),
        (status = 401, description = "Expired or invalid refresh token", body = crate::error::ApiError),
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ApiJson(request): ApiJson<LogoutRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let payload = state.auth.revoke(&request.refresh_token).await?;

    audit_log(&AuditEvent::TokenRevoked {
        subject: payload.subject().to_string(),
        token_id: payload.token_id().to_string(),
        ip_address: extract_ip_address(&headers),
    });

    Ok(Json(MessageResponse::new("refresh token revoked")))
}
