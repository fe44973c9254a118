//! Authentication failure kinds and their HTTP rejections

use super::jwt::TokenError;
use super::password::PasswordError;
use super::repository::RepositoryError;
use crate::error::ApiError;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use roster_core::RosterError;
use thiserror::Error;

const BEARER: &str = "Bearer";
const BEARER_INVALID: &str = r#"Bearer error="invalid_token""#;
const BEARER_EXPIRED: &str = r#"Bearer error="invalid_token", error_description="expired""#;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Incorrect login or password")]
    InvalidCredentials,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    TokenInvalid(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        AuthError::TokenInvalid(reason.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "NOT_AUTHENTICATED",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::TokenExpired => "TOKEN_EXPIRED",
            AuthError::TokenInvalid(_) => "TOKEN_INVALID",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// `WWW-Authenticate` challenge sent with the rejection
    pub fn challenge(&self) -> Option<&'static str> {
        match self {
            AuthError::NotAuthenticated | AuthError::InvalidCredentials => Some(BEARER),
            AuthError::TokenExpired => Some(BEARER_EXPIRED),
            AuthError::TokenInvalid(_) => Some(BEARER_INVALID),
            AuthError::Internal(_) => None,
        }
    }

    fn public_message(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "Not authenticated",
            AuthError::InvalidCredentials => "Incorrect login or password",
            AuthError::TokenExpired => "Token has expired",
            AuthError::TokenInvalid(_) => "Invalid token",
            AuthError::Internal(_) => "Internal server error",
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Internal(detail) => {
                tracing::error!(error = %detail, "Authentication failed internally")
            }
            AuthError::TokenInvalid(reason) => tracing::debug!(reason = %reason, "Token rejected"),
            _ => {}
        }

        let body = ApiError::new(self.code(), self.public_message());
        let mut response = (self.status(), Json(body)).into_response();
        if let Some(challenge) = self.challenge() {
            response
                .headers_mut()
                .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static(challenge));
        }
        response
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => AuthError::TokenExpired,
            TokenError::Invalid(reason) => AuthError::TokenInvalid(reason),
            TokenError::InvalidPayload(reason) => AuthError::TokenInvalid(reason.to_string()),
            other @ (TokenError::Encoding(_) | TokenError::UnsupportedAlgorithm(_)) => {
                AuthError::Internal(other.to_string())
            }
        }
    }
}

impl From<RepositoryError> for AuthError {
    fn from(err: RepositoryError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<RosterError> for AuthError {
    fn from(err: RosterError) -> Self {
        AuthError::Internal(err.to_string())
    }
}
