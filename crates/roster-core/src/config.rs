//! Roster Configuration Management
//!
//! Handles configuration from environment variables and TOML config files
//! with sensible defaults for development.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Environment variable naming an optional TOML config file
pub const CONFIG_PATH_ENV: &str = "ROSTER_CONFIG";

/// Signing algorithms accepted for access and refresh tokens (HMAC family)
pub const SUPPORTED_ALGORITHMS: [&str; 3] = ["HS256", "HS384", "HS512"];

/// Longest accepted access token lifetime (30 days)
pub const MAX_ACCESS_TTL_MIN: i64 = 30 * 24 * 60;

/// Longest accepted refresh token lifetime (10 years)
pub const MAX_REFRESH_TTL_DAYS: i64 = 3650;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database connections
    pub database: DatabaseConfig,

    /// Token signing and lifetime configuration
    pub auth: AuthConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        Self::from_toml_str(&content).map_err(|message| ConfigError::ParseError { path, message })
    }

    fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Load the file named by `ROSTER_CONFIG` (if any), apply environment
    /// overrides and validate the result.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) if !path.trim().is_empty() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from environment variables (env takes precedence)
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        // Server
        if let Ok(host) = std::env::var("API_HOST") {
            self.server.host = host;
        }
        if let Some(port) = env_parse("API_PORT")? {
            self.server.port = port;
        }
        if let Ok(origins) = std::env::var("CORS_ORIGINS") {
            self.server.cors_origins = split_list(&origins);
        }
        if let Ok(paths) = std::env::var("AUTH_PUBLIC_PATHS") {
            self.server.public_paths = split_list(&paths);
        }
        if let Ok(prefixes) = std::env::var("AUTH_PUBLIC_PREFIXES") {
            self.server.public_prefixes = split_list(&prefixes);
        }

        // PostgreSQL
        if let Ok(url) = std::env::var("DATABASE_URL") {
            let url = url.trim().to_string();
            self.database.postgres_url = (!url.is_empty()).then_some(url);
        }
        if let Some(size) = env_parse("DB_POOL_SIZE")? {
            self.database.pool_size = size;
        }
        if let Some(secs) = env_parse("DB_ACQUIRE_TIMEOUT_SECS")? {
            self.database.acquire_timeout_secs = secs;
        }

        // Auth
        if let Ok(secret) = std::env::var("SECRET_KEY") {
            self.auth.secret = secret;
        }
        if let Ok(algorithm) = std::env::var("ALGORITHM") {
            self.auth.algorithm = algorithm.trim().to_uppercase();
        }
        if let Some(minutes) = env_parse("ACCESS_TTL_MIN")? {
            self.auth.access_ttl_min = minutes;
        }
        if let Some(days) = env_parse("REFRESH_TTL_DAYS")? {
            self.auth.refresh_ttl_days = days;
        }
        if let Some(strict) = env_parse("AUTH_STRICT_ROTATION")? {
            self.auth.strict_rotation = strict;
        }
        if let Some(secs) = env_parse("REVOCATION_PRUNE_INTERVAL_SECS")? {
            self.auth.prune_interval_secs = secs;
        }

        // Logging
        if let Ok(level) = std::env::var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = env_parse("LOG_JSON")? {
            self.logging.json_format = json;
        }

        Ok(())
    }

    /// Validate cross-field constraints
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.auth.validate()
    }
}

fn env_parse<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
        Err(_) => Ok(None),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed origins for CORS (any origin when empty)
    pub cors_origins: Vec<String>,

    /// Extra exact paths that bypass the authentication gate
    pub public_paths: Vec<String>,

    /// Extra path prefixes that bypass the authentication gate
    pub public_prefixes: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_origins: vec![],
            public_paths: vec![],
            public_prefixes: vec![],
        }
    }
}

/// Database connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL; in-memory stores are used when unset
    pub postgres_url: Option<String>,

    /// PostgreSQL connection pool size
    pub pool_size: u32,

    /// Seconds to wait for a pooled connection before failing the request
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: None,
            pool_size: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// Token signing and lifetime configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Shared HMAC secret
    pub secret: String,

    /// Signing algorithm name (HS256, HS384 or HS512)
    pub algorithm: String,

    /// Access token lifetime in minutes
    pub access_ttl_min: i64,

    /// Refresh token lifetime in days
    pub refresh_ttl_days: i64,

    /// Revoke the presented refresh token whenever it is rotated
    pub strict_rotation: bool,

    /// Seconds between revocation ledger prune runs (0 disables pruning)
    pub prune_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: "development-secret-key-change-in-production".to_string(),
            algorithm: "HS256".to_string(),
            access_ttl_min: 15,
            refresh_ttl_days: 7,
            strict_rotation: false,
            prune_interval_secs: 3600,
        }
    }
}

// Secret is redacted from Debug output
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("secret", &"<redacted>")
            .field("algorithm", &self.algorithm)
            .field("access_ttl_min", &self.access_ttl_min)
            .field("refresh_ttl_days", &self.refresh_ttl_days)
            .field("strict_rotation", &self.strict_rotation)
            .field("prune_interval_secs", &self.prune_interval_secs)
            .finish()
    }
}

impl AuthConfig {
    /// Access token lifetime in seconds, saturating on overflow
    pub fn access_ttl_secs(&self) -> i64 {
        self.access_ttl_min.saturating_mul(60)
    }

    /// Refresh token lifetime in seconds, saturating on overflow
    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_ttl_days.saturating_mul(24 * 60 * 60)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::MissingRequired("SECRET_KEY".to_string()));
        }
        if !SUPPORTED_ALGORITHMS.contains(&self.algorithm.as_str()) {
            return Err(ConfigError::InvalidValue {
                key: "ALGORITHM".to_string(),
                value: self.algorithm.clone(),
            });
        }
        if self.access_ttl_min <= 0 || self.access_ttl_min > MAX_ACCESS_TTL_MIN {
            return Err(ConfigError::InvalidValue {
                key: "ACCESS_TTL_MIN".to_string(),
                value: self.access_ttl_min.to_string(),
            });
        }
        if self.refresh_ttl_days <= 0
            || self.refresh_ttl_days > MAX_REFRESH_TTL_DAYS
            || self.refresh_ttl_secs() <= self.access_ttl_secs()
        {
            return Err(ConfigError::InvalidValue {
                key: "REFRESH_TTL_DAYS".to_string(),
                value: self.refresh_ttl_days.to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}
