//! User storage
//!
//! The user store is the credential source for authentication and the
//! backing store for user management. Two implementations share the
//! [`UserStore`] trait: an in-memory map for tests and single-process
//! deployments, and PostgreSQL via SQLx.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::FromRow;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::{Result, RosterError};

/// Normalize a username or e-mail for storage and lookup (trim + case-fold)
pub fn normalize_identifier(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Stored user account including the password hash
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub disabled: bool,
    pub hashed_password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data required to create a user; the password is already hashed
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
}

impl NewUser {
    fn normalized(mut self) -> Self {
        self.username = normalize_identifier(&self.username);
        self.email = normalize_identifier(&self.email);
        self
    }
}

/// Partial update; `None` leaves a field unchanged
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub hashed_password: Option<String>,
}

impl UserPatch {
    pub fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.email.is_none()
            && self.full_name.is_none()
            && self.hashed_password.is_none()
    }

    fn normalized(mut self) -> Self {
        self.username = self.username.map(|u| normalize_identifier(&u));
        self.email = self.email.map(|e| normalize_identifier(&e));
        self
    }
}

/// Storage capability for user accounts
///
/// Lookups by username and e-mail are exact matches on normalized values.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Get user by ID
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>>;

    /// Get all users whose ID is in `ids`, ordered by ID
    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<UserRecord>>;

    /// List all users ordered by ID
    async fn list(&self) -> Result<Vec<UserRecord>>;

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>>;

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>>;

    /// Create a user, failing with [`RosterError::Conflict`] on a duplicate
    /// username or e-mail
    async fn insert(&self, user: NewUser) -> Result<UserRecord>;

    /// Create several users atomically: either all are stored or none
    async fn insert_many(&self, users: Vec<NewUser>) -> Result<Vec<UserRecord>>;

    /// Apply a patch; `Ok(None)` when the user does not exist
    async fn update(&self, id: i64, patch: UserPatch) -> Result<Option<UserRecord>>;

    /// Remove a user and return the removed record
    async fn delete(&self, id: i64) -> Result<Option<UserRecord>>;

    /// Check that the backing storage is reachable
    async fn ping(&self) -> Result<()>;
}

// ============================================================================
// In-memory store
// ============================================================================

#[derive(Debug, Default)]
struct MemoryUsers {
    last_id: i64,
    users: BTreeMap<i64, UserRecord>,
}

impl MemoryUsers {
    fn check_unique(&self, username: &str, email: &str, except: Option<i64>) -> Result<()> {
        for user in self.users.values() {
            if Some(user.id) == except {
                continue;
            }
            if user.username == username {
                return Err(RosterError::conflict("username"));
            }
            if user.email == email {
                return Err(RosterError::conflict("email"));
            }
        }
        Ok(())
    }

    fn insert(&mut self, user: NewUser) -> UserRecord {
        self.last_id += 1;
        let now = Utc::now();
        let record = UserRecord {
            id: self.last_id,
            username: user.username,
            email: user.email,
            full_name: user.full_name,
            disabled: false,
            hashed_password: user.hashed_password,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(record.id, record.clone());
        record
    }
}

/// In-memory user store
#[derive(Debug, Default)]
pub struct MemoryUserStore {
    inner: RwLock<MemoryUsers>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .filter(|u| ids.contains(&u.id))
            .cloned()
            .collect())
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        let inner = self.inner.read().await;
        Ok(inner.users.values().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let user = user.normalized();
        let mut inner = self.inner.write().await;
        inner.check_unique(&user.username, &user.email, None)?;
        Ok(inner.insert(user))
    }

    async fn insert_many(&self, users: Vec<NewUser>) -> Result<Vec<UserRecord>> {
        let users: Vec<NewUser> = users.into_iter().map(NewUser::normalized).collect();
        let mut inner = self.inner.write().await;

        for (i, user) in users.iter().enumerate() {
            inner.check_unique(&user.username, &user.email, None)?;
            // Duplicates inside the batch itself
            for other in &users[..i] {
                if other.username == user.username {
                    return Err(RosterError::conflict("username"));
                }
                if other.email == user.email {
                    return Err(RosterError::conflict("email"));
                }
            }
        }

        Ok(users.into_iter().map(|u| inner.insert(u)).collect())
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<Option<UserRecord>> {
        let patch = patch.normalized();
        let mut inner = self.inner.write().await;

        let Some(existing) = inner.users.get(&id).cloned() else {
            return Ok(None);
        };

        let username = patch.username.unwrap_or(existing.username);
        let email = patch.email.unwrap_or(existing.email);
        inner.check_unique(&username, &email, Some(id))?;

        let updated = UserRecord {
            username,
            email,
            full_name: patch.full_name.or(existing.full_name),
            hashed_password: patch.hashed_password.unwrap_or(existing.hashed_password),
            updated_at: Utc::now(),
            ..existing
        };
        inner.users.insert(id, updated.clone());
        Ok(Some(updated))
    }

    async fn delete(&self, id: i64) -> Result<Option<UserRecord>> {
        Ok(self.inner.write().await.users.remove(&id))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// PostgreSQL store
// ============================================================================

const USER_COLUMNS: &str =
    "id, username, email, full_name, disabled, hashed_password, created_at, updated_at";

/// DDL for the users table, applied by [`PgUserStore::ensure_schema`]
pub const USERS_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    username VARCHAR(50) UNIQUE NOT NULL,
    email VARCHAR(320) UNIQUE NOT NULL,
    full_name VARCHAR(255),
    disabled BOOLEAN NOT NULL DEFAULT FALSE,
    hashed_password VARCHAR(255) NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// PostgreSQL user store
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    /// Create from an existing pool
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the users table when it does not exist yet
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(USERS_TABLE_DDL)
            .execute(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to create users table: {e}")))?;
        Ok(())
    }
}

/// Map a write error, turning unique violations into conflicts
fn map_write_error(err: sqlx::Error, action: &str) -> RosterError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some(c) if c.contains("email") => "email",
                _ => "username",
            };
            return RosterError::conflict(field);
        }
    }
    RosterError::DatabaseError(format!("Failed to {action}: {err}"))
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to fetch user: {e}")))
    }

    async fn find_by_ids(&self, ids: &[i64]) -> Result<Vec<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ANY($1) ORDER BY id"
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to fetch users: {e}")))
    }

    async fn list(&self) -> Result<Vec<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to list users: {e}")))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to fetch user: {e}")))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to fetch user: {e}")))
    }

    async fn insert(&self, user: NewUser) -> Result<UserRecord> {
        let user = user.normalized();
        sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            INSERT INTO users (username, email, full_name, hashed_password)
            VALUES ($1, $2, $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "create user"))
    }

    async fn insert_many(&self, users: Vec<NewUser>) -> Result<Vec<UserRecord>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to begin transaction: {e}")))?;

        let mut created = Vec::with_capacity(users.len());
        for user in users.into_iter().map(NewUser::normalized) {
            let record = sqlx::query_as::<_, UserRecord>(&format!(
                r#"
                INSERT INTO users (username, email, full_name, hashed_password)
                VALUES ($1, $2, $3, $4)
                RETURNING {USER_COLUMNS}
                "#
            ))
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.full_name)
            .bind(&user.hashed_password)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| map_write_error(e, "create user"))?;
            created.push(record);
        }

        tx.commit()
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Failed to commit users: {e}")))?;

        Ok(created)
    }

    async fn update(&self, id: i64, patch: UserPatch) -> Result<Option<UserRecord>> {
        let patch = patch.normalized();
        sqlx::query_as::<_, UserRecord>(&format!(
            r#"
            UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                full_name = COALESCE($4, full_name),
                hashed_password = COALESCE($5, hashed_password),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(&patch.username)
        .bind(&patch.email)
        .bind(&patch.full_name)
        .bind(&patch.hashed_password)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_write_error(e, "update user"))
    }

    async fn delete(&self, id: i64) -> Result<Option<UserRecord>> {
        sqlx::query_as::<_, UserRecord>(&format!(
            "DELETE FROM users WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("Failed to delete user: {e}")))
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| RosterError::DatabaseError(format!("Database unreachable: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            full_name: None,
            hashed_password: "hash".to_string(),
        }
    }

    #[test]
    fn test_normalize_identifier() {
        assert_eq!(normalize_identifier("  John.Doe "), "john.doe");
        assert_eq!(normalize_identifier("Mail@Example.COM"), "mail@example.com");
    }

    #[tokio::test]
    async fn test_insert_normalizes_and_assigns_ids() {
        let store = MemoryUserStore::new();
        let first = store.insert(new_user(" Alice ", "Alice@Example.com")).await.unwrap();
        let second = store.insert(new_user("bob", "bob@example.com")).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.username, "alice");
        assert_eq!(first.email, "alice@example.com");
        assert!(!first.disabled);

        let found = store.find_by_username("alice").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(1));
        let found = store.find_by_email("alice@example.com").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(1));
    }

    #[tokio::test]
    async fn test_duplicate_username_and_email_conflict() {
        let store = MemoryUserStore::new();
        store.insert(new_user("alice", "alice@example.com")).await.unwrap();

        let err = store
            .insert(new_user("ALICE", "other@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::Conflict { ref field } if field == "username"));

        let err = store
            .insert(new_user("other", "alice@example.com"))
            .await
            .unwrap_err();
        assert!(matches!(err, RosterError::Conflict { ref field } if field == "email"));
    }

    #[tokio::test]
    async fn test_insert_many_is_all_or_nothing() {
        let store = MemoryUserStore::new();
        let result = store
            .insert_many(vec![
                new_user("carol", "carol@example.com"),
                new_user("carol", "carol2@example.com"),
            ])
            .await;

        assert!(result.is_err());
        assert!(store.list().await.unwrap().is_empty());

        let created = store
            .insert_many(vec![
                new_user("carol", "carol@example.com"),
                new_user("dave", "dave@example.com"),
            ])
            .await
            .unwrap();
        assert_eq!(created.len(), 2);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryUserStore::new();
        let user = store.insert(new_user("erin", "erin@example.com")).await.unwrap();
        store.insert(new_user("frank", "frank@example.com")).await.unwrap();

        let patch = UserPatch {
            full_name: Some("Erin Example".to_string()),
            ..Default::default()
        };
        let updated = store.update(user.id, patch).await.unwrap().unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Erin Example"));
        assert_eq!(updated.username, "erin");

        let clash = UserPatch {
            username: Some("Frank".to_string()),
            ..Default::default()
        };
        assert!(store.update(user.id, clash).await.is_err());

        assert!(store.update(99, UserPatch::default()).await.unwrap().is_none());

        let removed = store.delete(user.id).await.unwrap();
        assert_eq!(removed.map(|u| u.id), Some(user.id));
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
        assert!(store.delete(user.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_ids() {
        let store = MemoryUserStore::new();
        for name in ["u1", "u2", "u3"] {
            store
                .insert(new_user(name, &format!("{name}@example.com")))
                .await
                .unwrap();
        }

        let users = store.find_by_ids(&[3, 1, 42]).await.unwrap();
        let ids: Vec<i64> = users.iter().map(|u| u.id).collect();
        assert_eq!(ids, vec![1, 3]);
    }
}
