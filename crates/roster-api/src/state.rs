//! Application state management

use crate::auth::{
    AuthService, CredentialHasher, MemoryRevocationLedger, PasswordConfig, PasswordError,
    PublicRoutes, RevocationLedger, TokenCodec, TokenError, TokenIssuer,
};
use crate::projects::ProjectService;
use crate::users::UserService;
use roster_core::{
    AppConfig, ConfigError, MemoryProjectStore, MemoryUserStore, ProjectStore, UserStore,
};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors building the application state
#[derive(Debug, Error)]
pub enum StateError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Token codec setup failed: {0}")]
    Token(#[from] TokenError),

    #[error("Password hasher setup failed: {0}")]
    Password(#[from] PasswordError),
}

/// Application state shared across handlers
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Server start time
    pub start_time: Instant,
    pub auth: AuthService,
    pub users: UserService,
    pub projects: ProjectService,
    pub public_routes: PublicRoutes,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        user_store: Arc<dyn UserStore>,
        project_store: Arc<dyn ProjectStore>,
        ledger: Arc<dyn RevocationLedger>,
        password_config: PasswordConfig,
    ) -> Result<Self, StateError> {
        config.validate()?;
        let codec = Arc::new(TokenCodec::new(&config.auth)?);
        let issuer = TokenIssuer::new(codec, &config.auth);
        let hasher = CredentialHasher::new(password_config)?;

        let auth = AuthService::new(
            user_store.clone(),
            ledger,
            issuer,
            hasher.clone(),
            &config.auth,
        );
        let projects = ProjectService::new(project_store, user_store.clone());
        let users = UserService::new(user_store, hasher);
        let public_routes = PublicRoutes::from_config(&config.server);

        Ok(Self {
            config,
            start_time: Instant::now(),
            auth,
            users,
            projects,
            public_routes,
        })
    }

    /// State backed by process-local stores
    pub fn in_memory(
        config: AppConfig,
        password_config: PasswordConfig,
    ) -> Result<Self, StateError> {
        Self::new(
            config,
            Arc::new(MemoryUserStore::new()),
            Arc::new(MemoryProjectStore::new()),
            Arc::new(MemoryRevocationLedger::new()),
            password_config,
        )
    }

    /// Get uptime in seconds
    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
