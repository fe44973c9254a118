//! Revocation ledger storage
//!
//! The ledger is an append-only set of revoked token ids. The only
//! mutation besides `record` is `prune`, which forgets ids old enough
//! that the tokens they name have expired anyway.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Storage capability for revoked token ids
#[async_trait]
pub trait RevocationLedger: Send + Sync {
    async fn is_revoked(&self, token_id: &str) -> Result<bool, RepositoryError>;

    /// Record a revoked id; returns `true` when the id was not yet present
    ///
    /// Recording an id that is already present leaves the original
    /// timestamp in place.
    async fn record(&self, token_id: &str, revoked_at: DateTime<Utc>)
        -> Result<bool, RepositoryError>;

    /// Drop records revoked before `older_than`; returns how many went
    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError>;

    async fn ping(&self) -> Result<(), RepositoryError>;
}

// ============================================================================
// In-memory ledger
// ============================================================================

/// Process-local ledger, used for tests and when no database is configured
#[derive(Debug, Default)]
pub struct MemoryRevocationLedger {
    entries: RwLock<HashMap<String, DateTime<Utc>>>,
}

impl MemoryRevocationLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl RevocationLedger for MemoryRevocationLedger {
    async fn is_revoked(&self, token_id: &str) -> Result<bool, RepositoryError> {
        Ok(self.entries.read().await.contains_key(token_id))
    }

    async fn record(
        &self,
        token_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(token_id) {
            return Ok(false);
        }
        entries.insert(token_id.to_string(), revoked_at);
        Ok(true)
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, revoked_at| *revoked_at >= older_than);
        Ok((before - entries.len()) as u64)
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

// ============================================================================
// PostgreSQL ledger
// ============================================================================

const REVOKED_TOKENS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS auth_revoked_tokens (
    jti TEXT PRIMARY KEY,
    revoked_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const REVOKED_AT_INDEX_DDL: &str = r#"
CREATE INDEX IF NOT EXISTS idx_auth_revoked_tokens_revoked_at
    ON auth_revoked_tokens (revoked_at)
"#;

/// Ledger stored in the `auth_revoked_tokens` table
#[derive(Debug, Clone)]
pub struct PgRevocationLedger {
    pool: PgPool,
}

impl PgRevocationLedger {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the ledger table if it does not exist
    pub async fn ensure_schema(&self) -> Result<(), RepositoryError> {
        for ddl in [REVOKED_TOKENS_DDL, REVOKED_AT_INDEX_DDL] {
            sqlx::query(ddl)
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    RepositoryError::DatabaseError(format!("Failed to create ledger schema: {e}"))
                })?;
        }
        Ok(())
    }
}

#[async_trait]
impl RevocationLedger for PgRevocationLedger {
    async fn is_revoked(&self, token_id: &str) -> Result<bool, RepositoryError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM auth_revoked_tokens WHERE jti = $1)",
        )
        .bind(token_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(format!("Failed to query ledger: {e}")))
    }

    async fn record(
        &self,
        token_id: &str,
        revoked_at: DateTime<Utc>,
    ) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO auth_revoked_tokens (jti, revoked_at) VALUES ($1, $2) \
             ON CONFLICT (jti) DO NOTHING",
        )
        .bind(token_id)
        .bind(revoked_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::DatabaseError(format!("Failed to record revocation: {e}")))?;

        Ok(result.rows_affected() == 1)
    }

    async fn prune(&self, older_than: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let result = sqlx::query("DELETE FROM auth_revoked_tokens WHERE revoked_at < $1")
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(format!("Failed to prune ledger: {e}")))?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RepositoryError::DatabaseError(format!("Ledger unavailable: {e}")))?;
        Ok(())
    }
}
