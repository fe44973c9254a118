//! Authentication service layer
//!
//! Credential verification, token pair issuance, refresh rotation and
//! revocation. Storage is injected: user lookups go through a
//! [`UserStore`], revoked token ids through a [`RevocationLedger`].

use super::error::AuthError;
use super::issuer::{TokenIssuer, TokenPair};
use super::jwt::{now_unix, TokenCodec, TokenPayload, TokenType};
use super::password::CredentialHasher;
use super::repository::RevocationLedger;
use chrono::{DateTime, Duration, TimeZone, Utc};
use roster_core::{normalize_identifier, AuthConfig, UserRecord, UserStore};
use std::sync::Arc;

/// Result of a successful login
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserRecord,
    pub tokens: TokenPair,
    pub issued_at: DateTime<Utc>,
}

/// Result of a successful refresh
#[derive(Debug, Clone)]
pub struct Rotation {
    pub subject: String,
    /// Token id of the refresh token that was exchanged
    pub previous_token_id: String,
    pub tokens: TokenPair,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    ledger: Arc<dyn RevocationLedger>,
    issuer: TokenIssuer,
    hasher: CredentialHasher,
    strict_rotation: bool,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        ledger: Arc<dyn RevocationLedger>,
        issuer: TokenIssuer,
        hasher: CredentialHasher,
        config: &AuthConfig,
    ) -> Self {
        Self {
            users,
            ledger,
            issuer,
            hasher,
            strict_rotation: config.strict_rotation,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        self.issuer.codec()
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }

    pub fn strict_rotation(&self) -> bool {
        self.strict_rotation
    }

    /// Verify a login and password
    ///
    /// A login containing `@` is looked up by e-mail, anything else by
    /// username. Unknown login, wrong password and disabled account all
    /// fail with the same `InvalidCredentials`.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<UserRecord, AuthError> {
        let login = normalize_identifier(login);
        let user = if login.contains('@') {
            self.users.find_by_email(&login).await?
        } else {
            self.users.find_by_username(&login).await?
        };

        let Some(user) = user else {
            self.hasher.verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.hasher.verify(password, &user.hashed_password)? || user.disabled {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    pub fn issue_tokens(&self, subject: &str) -> Result<TokenPair, AuthError> {
        Ok(self.issuer.issue(subject)?)
    }

    /// Authenticate and issue a pair for the user
    pub async fn login(&self, login: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let user = self.authenticate(login, password).await?;
        let now = now_unix();
        let tokens = self.issuer.issue_at(&user.id.to_string(), now)?;
        let issued_at = Utc
            .timestamp_opt(now, 0)
            .single()
            .ok_or_else(|| AuthError::Internal(format!("timestamp out of range: {now}")))?;

        Ok(LoginOutcome {
            user,
            tokens,
            issued_at,
        })
    }

    /// Exchange a refresh token for a new pair
    ///
    /// With strict rotation the exchanged token is recorded in the ledger
    /// first. The record is a conditional insert, so of two concurrent
    /// refreshes with the same token exactly one succeeds.
    pub async fn refresh(&self, refresh_token: &str) -> Result<Rotation, AuthError> {
        let payload = self.decode_refresh(refresh_token)?;

        if self.strict_rotation {
            let newly_recorded = self.ledger.record(payload.token_id(), Utc::now()).await?;
            if !newly_recorded {
                return Err(AuthError::invalid("refresh token revoked"));
            }
        } else if self.ledger.is_revoked(payload.token_id()).await? {
            return Err(AuthError::invalid("refresh token revoked"));
        }

        let tokens = self.issuer.issue(payload.subject())?;
        Ok(Rotation {
            subject: payload.subject().to_string(),
            previous_token_id: payload.token_id().to_string(),
            tokens,
        })
    }

    /// Record a refresh token in the ledger; revoking twice is not an error
    pub async fn revoke(&self, refresh_token: &str) -> Result<TokenPayload, AuthError> {
        let payload = self.decode_refresh(refresh_token)?;
        self.ledger.record(payload.token_id(), Utc::now()).await?;
        Ok(payload)
    }

    pub async fn is_revoked(&self, token_id: &str) -> Result<bool, AuthError> {
        Ok(self.ledger.is_revoked(token_id).await?)
    }

    /// Decode a token presented at the request gate
    pub fn decode_access(&self, token: &str) -> Result<TokenPayload, AuthError> {
        let payload = self.codec().decode(token)?;
        if payload.token_type() != TokenType::Access {
            return Err(AuthError::invalid("expected access token"));
        }
        Ok(payload)
    }

    fn decode_refresh(&self, token: &str) -> Result<TokenPayload, AuthError> {
        let payload = self.codec().decode(token)?;
        if payload.token_type() != TokenType::Refresh {
            return Err(AuthError::invalid("expected refresh token"));
        }
        Ok(payload)
    }

    /// Forget ledger records older than the refresh lifetime
    ///
    /// Any token they name has expired, so the gate would reject it anyway.
    pub async fn prune_revoked(&self) -> Result<u64, AuthError> {
        self.prune_revoked_at(Utc::now()).await
    }

    pub async fn prune_revoked_at(&self, now: DateTime<Utc>) -> Result<u64, AuthError> {
        let cutoff = Duration::try_seconds(self.issuer.refresh_ttl_secs())
            .and_then(|ttl| now.checked_sub_signed(ttl))
            .ok_or_else(|| AuthError::Internal("refresh lifetime out of range".to_string()))?;
        Ok(self.ledger.prune(cutoff).await?)
    }

    pub async fn ping(&self) -> Result<(), AuthError> {
        self.users.ping().await?;
        self.ledger.ping().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password::PasswordConfig;
    use crate::auth::repository::{MemoryRevocationLedger, RepositoryError};
    use async_trait::async_trait;
    use roster_core::{MemoryUserStore, NewUser, UserPatch};

    struct Fixture {
        service: AuthService,
        users: Arc<MemoryUserStore>,
        ledger: Arc<MemoryRevocationLedger>,
    }

    fn config(strict_rotation: bool) -> AuthConfig {
        AuthConfig {
            secret: "service-test-secret".to_string(),
            strict_rotation,
            ..AuthConfig::default()
        }
    }

    async fn fixture(strict_rotation: bool) -> Fixture {
        let config = config(strict_rotation);
        let users = Arc::new(MemoryUserStore::new());
        let ledger = Arc::new(MemoryRevocationLedger::new());
        let hasher = CredentialHasher::new(PasswordConfig::light()).unwrap();
        let codec = Arc::new(TokenCodec::new(&config).unwrap());

        users
            .insert(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                full_name: Some("Alice".to_string()),
                hashed_password: hasher.hash("secret1").unwrap(),
            })
            .await
            .unwrap();

        let service = AuthService::new(
            users.clone(),
            ledger.clone(),
            TokenIssuer::new(codec, &config),
            hasher,
            &config,
        );

        Fixture {
            service,
            users,
            ledger,
        }
    }

    #[tokio::test]
    async fn test_authenticate_by_username_and_email() {
        let fx = fixture(false).await;

        let by_name = fx.service.authenticate("  Alice ", "secret1").await.unwrap();
        let by_email = fx
            .service
            .authenticate("ALICE@example.com", "secret1")
            .await
            .unwrap();
        assert_eq!(by_name.id, by_email.id);
    }

    #[tokio::test]
    async fn test_unknown_user_and_wrong_password_are_indistinguishable() {
        let fx = fixture(false).await;

        let unknown = fx.service.authenticate("bob", "secret1").await.unwrap_err();
        let wrong = fx.service.authenticate("alice", "secret2").await.unwrap_err();

        assert!(matches!(unknown, AuthError::InvalidCredentials));
        assert!(matches!(wrong, AuthError::InvalidCredentials));
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_disabled_account_is_rejected() {
        let users = Arc::new(MemoryUserStore::new());
        let hasher = CredentialHasher::new(PasswordConfig::light()).unwrap();
        let mut record = users
            .insert(NewUser {
                username: "carol".to_string(),
                email: "carol@example.com".to_string(),
                full_name: None,
                hashed_password: hasher.hash("secret1").unwrap(),
            })
            .await
            .unwrap();
        record.disabled = true;

        struct DisabledStore(UserRecord);

        #[async_trait]
        impl UserStore for DisabledStore {
            async fn find_by_id(&self, _: i64) -> roster_core::Result<Option<UserRecord>> {
                Ok(Some(self.0.clone()))
            }
            async fn find_by_ids(&self, _: &[i64]) -> roster_core::Result<Vec<UserRecord>> {
                Ok(vec![self.0.clone()])
            }
            async fn list(&self) -> roster_core::Result<Vec<UserRecord>> {
                Ok(vec![self.0.clone()])
            }
            async fn find_by_username(&self, _: &str) -> roster_core::Result<Option<UserRecord>> {
                Ok(Some(self.0.clone()))
            }
            async fn find_by_email(&self, _: &str) -> roster_core::Result<Option<UserRecord>> {
                Ok(Some(self.0.clone()))
            }
            async fn insert(&self, _: NewUser) -> roster_core::Result<UserRecord> {
                Ok(self.0.clone())
            }
            async fn insert_many(&self, _: Vec<NewUser>) -> roster_core::Result<Vec<UserRecord>> {
                Ok(vec![])
            }
            async fn update(&self, _: i64, _: UserPatch) -> roster_core::Result<Option<UserRecord>> {
                Ok(None)
            }
            async fn delete(&self, _: i64) -> roster_core::Result<Option<UserRecord>> {
                Ok(None)
            }
            async fn ping(&self) -> roster_core::Result<()> {
                Ok(())
            }
        }

        let config = config(false);
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        let service = AuthService::new(
            Arc::new(DisabledStore(record)),
            Arc::new(MemoryRevocationLedger::new()),
            TokenIssuer::new(codec, &config),
            hasher,
            &config,
        );

        let err = service.authenticate("carol", "secret1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_issues_pair_for_user_id() {
        let fx = fixture(false).await;
        let outcome = fx.service.login("alice", "secret1").await.unwrap();

        let access = fx.service.decode_access(outcome.tokens.access_token()).unwrap();
        assert_eq!(access.subject(), outcome.user.id.to_string());
        assert_eq!(access.issued_at(), outcome.issued_at.timestamp());
        assert_ne!(outcome.tokens.access_token(), outcome.tokens.refresh_token());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let fx = fixture(false).await;
        let pair = fx.service.issue_tokens("1").unwrap();

        let err = fx.service.refresh(pair.access_token()).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[tokio::test]
    async fn test_gate_decode_rejects_refresh_token() {
        let fx = fixture(false).await;
        let pair = fx.service.issue_tokens("1").unwrap();

        let err = fx.service.decode_access(pair.refresh_token()).unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[tokio::test]
    async fn test_loose_rotation_keeps_old_token_usable() {
        let fx = fixture(false).await;
        let pair = fx.service.issue_tokens("1").unwrap();

        let first = fx.service.refresh(pair.refresh_token()).await.unwrap();
        let second = fx.service.refresh(pair.refresh_token()).await.unwrap();

        assert_eq!(first.subject, "1");
        assert_ne!(first.tokens.refresh_token(), pair.refresh_token());
        assert_ne!(first.tokens, second.tokens);
        assert!(fx.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_strict_rotation_is_single_use() {
        let fx = fixture(true).await;
        let pair = fx.service.issue_tokens("1").unwrap();

        let rotation = fx.service.refresh(pair.refresh_token()).await.unwrap();
        assert!(fx.service.is_revoked(&rotation.previous_token_id).await.unwrap());

        let err = fx.service.refresh(pair.refresh_token()).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));

        // The successor still works
        assert!(fx.service.refresh(rotation.tokens.refresh_token()).await.is_ok());
    }

    #[tokio::test]
    async fn test_strict_rotation_concurrent_refresh_has_one_winner() {
        let fx = fixture(true).await;
        let pair = fx.service.issue_tokens("1").unwrap();

        let (a, b) = tokio::join!(
            fx.service.refresh(pair.refresh_token()),
            fx.service.refresh(pair.refresh_token())
        );
        assert_eq!(a.is_ok() as u8 + b.is_ok() as u8, 1);
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent_and_enforced() {
        let fx = fixture(false).await;
        let pair = fx.service.issue_tokens("1").unwrap();

        let payload = fx.service.revoke(pair.refresh_token()).await.unwrap();
        assert!(fx.service.is_revoked(payload.token_id()).await.unwrap());
        fx.service.revoke(pair.refresh_token()).await.unwrap();
        assert!(fx.service.is_revoked(payload.token_id()).await.unwrap());

        let err = fx.service.refresh(pair.refresh_token()).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
    }

    #[tokio::test]
    async fn test_revoke_rejects_access_token() {
        let fx = fixture(false).await;
        let pair = fx.service.issue_tokens("1").unwrap();

        let err = fx.service.revoke(pair.access_token()).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid(_)));
        assert!(fx.ledger.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_refresh_token() {
        let fx = fixture(false).await;
        let stale = fx
            .service
            .codec()
            .encode("1", TokenType::Refresh, 1_000, 2_000)
            .unwrap();

        let err = fx.service.refresh(&stale).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenExpired));
    }

    #[tokio::test]
    async fn test_prune_uses_refresh_ttl() {
        let fx = fixture(false).await;
        let now = Utc::now();
        fx.ledger
            .record("ancient", now - Duration::days(8))
            .await
            .unwrap();
        fx.ledger
            .record("fresh", now - Duration::days(6))
            .await
            .unwrap();

        assert_eq!(fx.service.prune_revoked_at(now).await.unwrap(), 1);
        assert!(fx.service.is_revoked("fresh").await.unwrap());
    }

    #[tokio::test]
    async fn test_prune_with_unbounded_ttl_fails_cleanly() {
        let fx = fixture(false).await;
        let config = AuthConfig {
            refresh_ttl_days: 1_000_000_000_000,
            ..config(false)
        };
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        let service = AuthService::new(
            fx.users.clone(),
            fx.ledger.clone(),
            TokenIssuer::new(codec, &config),
            CredentialHasher::new(PasswordConfig::light()).unwrap(),
            &config,
        );

        let err = service.prune_revoked().await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
    }

    struct FailingLedger;

    #[async_trait]
    impl RevocationLedger for FailingLedger {
        async fn is_revoked(&self, _: &str) -> Result<bool, RepositoryError> {
            Err(RepositoryError::DatabaseError("connection refused".into()))
        }
        async fn record(&self, _: &str, _: DateTime<Utc>) -> Result<bool, RepositoryError> {
            Err(RepositoryError::DatabaseError("connection refused".into()))
        }
        async fn prune(&self, _: DateTime<Utc>) -> Result<u64, RepositoryError> {
            Err(RepositoryError::DatabaseError("connection refused".into()))
        }
        async fn ping(&self) -> Result<(), RepositoryError> {
            Err(RepositoryError::DatabaseError("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn test_ledger_failure_is_internal_not_unrevoked() {
        let fx = fixture(false).await;
        let config = config(false);
        let codec = Arc::new(TokenCodec::new(&config).unwrap());
        let service = AuthService::new(
            fx.users.clone(),
            Arc::new(FailingLedger),
            TokenIssuer::new(codec, &config),
            CredentialHasher::new(PasswordConfig::light()).unwrap(),
            &config,
        );
        let pair = service.issue_tokens("1").unwrap();

        let err = service.refresh(pair.refresh_token()).await.unwrap_err();
        assert!(matches!(err, AuthError::Internal(_)));
        assert!(service.ping().await.is_err());
    }
}
