//! Access/refresh token pair minting

use super::jwt::{now_unix, TokenCodec, TokenError, TokenType};
use roster_core::AuthConfig;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Signed access and refresh tokens for one subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct TokenPair {
    access_token: String,
    refresh_token: String,
    /// Always "bearer"
    #[schema(example = "bearer")]
    token_type: String,
}

impl TokenPair {
    pub fn bearer(access_token: String, refresh_token: String) -> Self {
        Self {
            access_token,
            refresh_token,
            token_type: "bearer".to_string(),
        }
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }
}

/// Mints token pairs with the configured lifetimes
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    codec: Arc<TokenCodec>,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl TokenIssuer {
    pub fn new(codec: Arc<TokenCodec>, config: &AuthConfig) -> Self {
        Self {
            codec,
            access_ttl_secs: config.access_ttl_secs(),
            refresh_ttl_secs: config.refresh_ttl_secs(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_secs
    }

    pub fn issue(&self, subject: &str) -> Result<TokenPair, TokenError> {
        self.issue_at(subject, now_unix())
    }

    /// Both tokens share `now` as their issue time
    pub fn issue_at(&self, subject: &str, now: i64) -> Result<TokenPair, TokenError> {
        let access_exp = now.saturating_add(self.access_ttl_secs);
        let refresh_exp = now.saturating_add(self.refresh_ttl_secs);
        let access = self.codec.encode(subject, TokenType::Access, now, access_exp)?;
        let refresh = self.codec.encode(subject, TokenType::Refresh, now, refresh_exp)?;

        Ok(TokenPair::bearer(access, refresh))
    }
}
