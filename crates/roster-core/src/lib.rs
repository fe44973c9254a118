//! Roster Core - Configuration, shared errors, user and project storage
//!
//! This crate defines the core abstractions used throughout Roster:
//! - Configuration management
//! - Common error types
//! - User records and the `UserStore` storage trait
//! - Projects and the `ProjectStore` storage trait
//! - PostgreSQL connection pooling

pub mod config;
pub mod projects;
pub mod users;

pub use config::{
    AppConfig, AuthConfig, ConfigError, DatabaseConfig, LoggingConfig, ServerConfig,
    MAX_ACCESS_TTL_MIN, MAX_REFRESH_TTL_DAYS,
};
pub use projects::{
    MemoryProjectStore, NewProject, PgProjectStore, ProjectFilter, ProjectOrder, ProjectPage,
    ProjectPatch, ProjectRecord, ProjectStatus, ProjectStore,
};
pub use users::{
    normalize_identifier, MemoryUserStore, NewUser, PgUserStore, UserPatch, UserRecord, UserStore,
};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Core error types for Roster operations
#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("User with this {field} already exists")]
    Conflict { field: String },

    /// Write would break a uniqueness or reference constraint
    #[error("{0}")]
    Integrity(String),

    #[error("Not permitted: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RosterError {
    pub fn conflict(field: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RosterError>;

// ============================================================================
// Database
// ============================================================================

/// Open a PostgreSQL pool using the configured size and acquire timeout
pub async fn connect_pool(config: &DatabaseConfig, url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .connect(url)
        .await
        .map_err(|e| RosterError::DatabaseError(format!("PostgreSQL connection failed: {e}")))?;

    tracing::info!(pool_size = config.pool_size, "Connected to PostgreSQL");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_message() {
        let err = RosterError::conflict("email");
        assert_eq!(err.to_string(), "User with this email already exists");
    }

    #[test]
    fn test_config_error_conversion() {
        let err: RosterError = ConfigError::MissingRequired("SECRET_KEY".to_string()).into();
        assert!(matches!(err, RosterError::ConfigError(_)));
    }

    #[test]
    fn test_integrity_message_is_verbatim() {
        let err = RosterError::Integrity("Project with this name already exists".to_string());
        assert_eq!(err.to_string(), "Project with this name already exists");
    }
}
