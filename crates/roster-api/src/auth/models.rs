//! Authentication request and response models

use super::issuer::TokenPair;
use crate::users::UserPublic;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

/// OAuth2 password form; `username` may also hold an e-mail
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginForm {
    #[validate(length(min = 1, max = 254))]
    pub username: String,
    #[validate(length(min = 1, max = 128))]
    pub password: String,
}

/// JSON login by username or e-mail
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 254))]
    #[schema(example = "alice")]
    pub login: String,
    #[validate(length(min = 1, max = 128))]
    #[schema(example = "string1")]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: String,
}

/// Login response with the user and a fresh token pair
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserPublic,
    pub tokens: TokenPair,
    pub issued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
