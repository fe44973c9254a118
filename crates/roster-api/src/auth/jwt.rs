//! JWT token encoding and decoding
//!
//! Tokens are signed with a shared HMAC secret. Every token carries
//! `sub`, `type`, `jti`, `iat` and `exp`; `scope` is optional. Decoding
//! checks the signature first and the expiry second, so a token that is
//! both forged and stale is reported as invalid rather than expired.

use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use roster_core::AuthConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

/// Which role a token plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenType::Access => "access",
            TokenType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims as they appear on the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    /// JWT ID - unique per issued token, used by the revocation ledger
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Token encoding and decoding errors
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Token has expired")]
    Expired,

    #[error("Invalid token: {0}")]
    Invalid(String),

    #[error("Invalid token payload: {0}")]
    InvalidPayload(&'static str),

    #[error("Failed to encode JWT: {0}")]
    Encoding(#[source] jsonwebtoken::errors::Error),

    #[error("Unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Decoded, validated token content
///
/// Construction goes through [`TokenPayload::new`], which enforces
/// a non-empty subject and token id and `expires_at > issued_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPayload {
    subject: String,
    token_type: TokenType,
    issued_at: i64,
    expires_at: i64,
    token_id: String,
    scope: Option<String>,
}

impl TokenPayload {
    pub fn new(
        subject: impl Into<String>,
        token_type: TokenType,
        issued_at: i64,
        expires_at: i64,
        token_id: impl Into<String>,
        scope: Option<String>,
    ) -> Result<Self, TokenError> {
        let subject = subject.into();
        let token_id = token_id.into();

        if subject.trim().is_empty() {
            return Err(TokenError::InvalidPayload("subject is empty"));
        }
        if token_id.is_empty() {
            return Err(TokenError::InvalidPayload("token id is empty"));
        }
        if issued_at <= 0 {
            return Err(TokenError::InvalidPayload("issue time is not positive"));
        }
        if expires_at <= issued_at {
            return Err(TokenError::InvalidPayload("expiry is not after issue time"));
        }

        Ok(Self {
            subject,
            token_type,
            issued_at,
            expires_at,
            token_id,
            scope,
        })
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }

    pub fn issued_at(&self) -> i64 {
        self.issued_at
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }

    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// Expiry is inclusive: a token is dead at exactly `expires_at`
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    fn to_claims(&self) -> Claims {
        Claims {
            sub: self.subject.clone(),
            token_type: self.token_type,
            jti: self.token_id.clone(),
            iat: self.issued_at,
            exp: self.expires_at,
            scope: self.scope.clone(),
        }
    }
}

impl TryFrom<Claims> for TokenPayload {
    type Error = TokenError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        TokenPayload::new(
            claims.sub,
            claims.token_type,
            claims.iat,
            claims.exp,
            claims.jti,
            claims.scope,
        )
    }
}

/// Fresh 32-character hex token id
pub fn new_token_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Current Unix time in seconds
pub fn now_unix() -> i64 {
    Utc::now().timestamp()
}

/// Parse an HMAC algorithm name
pub fn parse_algorithm(name: &str) -> Result<Algorithm, TokenError> {
    let algorithm = Algorithm::from_str(name)
        .map_err(|_| TokenError::UnsupportedAlgorithm(name.to_string()))?;
    match algorithm {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(algorithm),
        _ => Err(TokenError::UnsupportedAlgorithm(name.to_string())),
    }
}

/// Signs and verifies tokens with one secret and one algorithm
#[derive(Clone)]
pub struct TokenCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn new(config: &AuthConfig) -> Result<Self, TokenError> {
        let algorithm = parse_algorithm(&config.algorithm)?;
        Ok(Self::with_secret(config.secret.as_bytes(), algorithm))
    }

    fn with_secret(secret: &[u8], algorithm: Algorithm) -> Self {
        // Expiry is checked by hand after the signature so the boundary is
        // inclusive and there is no leeway.
        let mut validation = Validation::new(algorithm);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            algorithm,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Sign a token with a fresh token id
    pub fn encode(
        &self,
        subject: &str,
        token_type: TokenType,
        issued_at: i64,
        expires_at: i64,
    ) -> Result<String, TokenError> {
        let payload = TokenPayload::new(
            subject,
            token_type,
            issued_at,
            expires_at,
            new_token_id(),
            None,
        )?;
        self.encode_payload(&payload)
    }

    pub fn encode_payload(&self, payload: &TokenPayload) -> Result<String, TokenError> {
        encode(
            &Header::new(self.algorithm),
            &payload.to_claims(),
            &self.encoding_key,
        )
        .map_err(TokenError::Encoding)
    }

    pub fn decode(&self, token: &str) -> Result<TokenPayload, TokenError> {
        self.decode_at(token, now_unix())
    }

    /// Decode against an explicit clock
    pub fn decode_at(&self, token: &str, now: i64) -> Result<TokenPayload, TokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| TokenError::Invalid(e.to_string()))?;

        let payload = TokenPayload::try_from(data.claims).map_err(|e| match e {
            TokenError::InvalidPayload(reason) => TokenError::Invalid(reason.to_string()),
            other => other,
        })?;

        if payload.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(secret: &str, algorithm: &str) -> TokenCodec {
        let config = AuthConfig {
            secret: secret.to_string(),
            algorithm: algorithm.to_string(),
            ..AuthConfig::default()
        };
        TokenCodec::new(&config).unwrap()
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let codec = codec("test-secret", "HS256");
        let now = now_unix();
        let token = codec.encode("42", TokenType::Access, now, now + 900).unwrap();

        let payload = codec.decode(&token).unwrap();
        assert_eq!(payload.subject(), "42");
        assert_eq!(payload.token_type(), TokenType::Access);
        assert_eq!(payload.issued_at(), now);
        assert_eq!(payload.expires_at(), now + 900);
        assert_eq!(payload.token_id().len(), 32);
        assert!(payload.scope().is_none());
    }

    #[test]
    fn test_scope_survives_round_trip() {
        let codec = codec("test-secret", "HS256");
        let now = now_unix();
        let payload = TokenPayload::new(
            "7",
            TokenType::Access,
            now,
            now + 60,
            new_token_id(),
            Some("users:read".to_string()),
        )
        .unwrap();

        let token = codec.encode_payload(&payload).unwrap();
        assert_eq!(codec.decode(&token).unwrap(), payload);
    }

    #[test]
    fn test_type_claim_on_the_wire() {
        let claims = Claims {
            sub: "1".to_string(),
            token_type: TokenType::Refresh,
            jti: "abc".to_string(),
            iat: 1,
            exp: 2,
            scope: None,
        };
        let json = serde_json::to_value(&claims).unwrap();
        assert_eq!(json["type"], "refresh");
        assert!(json.get("scope").is_none());
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let codec = codec("test-secret", "HS256");
        let token = codec
            .encode("42", TokenType::Access, 1_000, 2_000)
            .unwrap();

        assert!(codec.decode_at(&token, 1_999).is_ok());
        assert!(matches!(
            codec.decode_at(&token, 2_000),
            Err(TokenError::Expired)
        ));
        assert!(matches!(
            codec.decode_at(&token, 2_001),
            Err(TokenError::Expired)
        ));
    }

    #[test]
    fn test_token_ids_are_unique() {
        let codec = codec("test-secret", "HS256");
        let now = now_unix();
        let a = codec.encode("1", TokenType::Access, now, now + 60).unwrap();
        let b = codec.encode("1", TokenType::Access, now, now + 60).unwrap();

        let a = codec.decode(&a).unwrap();
        let b = codec.decode(&b).unwrap();
        assert_ne!(a.token_id(), b.token_id());
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let now = now_unix();
        let token = codec("secret-a", "HS256")
            .encode("1", TokenType::Access, now, now + 60)
            .unwrap();

        let result = codec("secret-b", "HS256").decode(&token);
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_forged_and_expired_reports_invalid() {
        let token = codec("secret-a", "HS256")
            .encode("1", TokenType::Access, 1_000, 2_000)
            .unwrap();

        let result = codec("secret-b", "HS256").decode_at(&token, 5_000);
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_algorithm_mismatch_is_invalid() {
        let now = now_unix();
        let token = codec("shared", "HS512")
            .encode("1", TokenType::Access, now, now + 60)
            .unwrap();

        let result = codec("shared", "HS256").decode(&token);
        assert!(matches!(result, Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_garbage_is_invalid() {
        let codec = codec("test-secret", "HS256");
        assert!(matches!(
            codec.decode("not-a-token"),
            Err(TokenError::Invalid(_))
        ));
        assert!(matches!(codec.decode(""), Err(TokenError::Invalid(_))));
    }

    #[test]
    fn test_payload_invariants() {
        assert!(matches!(
            TokenPayload::new("", TokenType::Access, 1, 2, "id", None),
            Err(TokenError::InvalidPayload(_))
        ));
        assert!(matches!(
            TokenPayload::new("1", TokenType::Access, 1, 2, "", None),
            Err(TokenError::InvalidPayload(_))
        ));
        assert!(matches!(
            TokenPayload::new("1", TokenType::Access, 2, 2, "id", None),
            Err(TokenError::InvalidPayload(_))
        ));
        assert!(matches!(
            TokenPayload::new("   ", TokenType::Access, 1, 2, "id", None),
            Err(TokenError::InvalidPayload(_))
        ));
        for issued_at in [0, -50] {
            assert!(matches!(
                TokenPayload::new("1", TokenType::Access, issued_at, 10, "id", None),
                Err(TokenError::InvalidPayload(_))
            ));
        }
    }

    #[test]
    fn test_signed_claims_breaking_invariants_are_invalid() {
        let codec = codec("test-secret", "HS256");
        let now = now_unix();
        let sign = |sub: &str, iat: i64| {
            let claims = Claims {
                sub: sub.to_string(),
                token_type: TokenType::Access,
                jti: new_token_id(),
                iat,
                exp: now + 60,
                scope: None,
            };
            encode(
                &Header::new(Algorithm::HS256),
                &claims,
                &EncodingKey::from_secret(b"test-secret"),
            )
            .unwrap()
        };

        assert!(matches!(
            codec.decode(&sign(" ", now)),
            Err(TokenError::Invalid(_))
        ));
        assert!(matches!(
            codec.decode(&sign("1", -100)),
            Err(TokenError::Invalid(_))
        ));
        assert!(matches!(
            codec.encode(" ", TokenType::Access, -100, now + 60),
            Err(TokenError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_encode_rejects_empty_subject() {
        let codec = codec("test-secret", "HS256");
        assert!(matches!(
            codec.encode("", TokenType::Access, 1, 2),
            Err(TokenError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_parse_algorithm() {
        assert_eq!(parse_algorithm("HS384").unwrap(), Algorithm::HS384);
        assert!(matches!(
            parse_algorithm("RS256"),
            Err(TokenError::UnsupportedAlgorithm(_))
        ));
        assert!(matches!(
            parse_algorithm("none"),
            Err(TokenError::UnsupportedAlgorithm(_))
        ));
    }
}
