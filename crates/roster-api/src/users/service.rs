//! User management service
//!
//! Validates requests, hashes passwords and delegates storage to the
//! injected [`UserStore`].

use super::models::{UserCreate, UserUpdate};
use crate::auth::password::CredentialHasher;
use roster_core::{NewUser, Result, RosterError, UserPatch, UserRecord, UserStore};
use std::sync::Arc;
use validator::ValidationErrors;

#[derive(Clone)]
pub struct UserService {
    store: Arc<dyn UserStore>,
    hasher: CredentialHasher,
}

fn validation_error(errors: ValidationErrors) -> RosterError {
    RosterError::ValidationError(errors.to_string())
}

impl UserService {
    pub fn new(store: Arc<dyn UserStore>, hasher: CredentialHasher) -> Self {
        Self { store, hasher }
    }

    pub async fn get(&self, id: i64) -> Result<UserRecord> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or_else(|| RosterError::NotFound("User".to_string()))
    }

    /// All users, or only those in `ids` when given
    pub async fn list(&self, ids: Option<&[i64]>) -> Result<Vec<UserRecord>> {
        match ids {
            Some(ids) => self.store.find_by_ids(ids).await,
            None => self.store.list().await,
        }
    }

    pub async fn create(&self, request: UserCreate) -> Result<UserRecord> {
        let user = self.prepare(request)?;
        self.store.insert(user).await
    }

    /// Create several users; either all are stored or none
    pub async fn create_many(&self, requests: Vec<UserCreate>) -> Result<Vec<UserRecord>> {
        let users = requests
            .into_iter()
            .map(|request| self.prepare(request))
            .collect::<Result<Vec<_>>>()?;
        self.store.insert_many(users).await
    }

    pub async fn update(&self, id: i64, request: UserUpdate) -> Result<UserRecord> {
        request.check().map_err(validation_error)?;

        let hashed_password = match request.password.as_deref() {
            Some(password) => Some(self.hash(password)?),
            None => None,
        };
        let patch = UserPatch {
            username: request.username,
            email: request.email,
            full_name: request.full_name.map(|name| name.trim().to_string()),
            hashed_password,
        };

        self.store
            .update(id, patch)
            .await?
            .ok_or_else(|| RosterError::NotFound("User".to_string()))
    }

    pub async fn delete(&self, id: i64) -> Result<UserRecord> {
        self.store
            .delete(id)
            .await?
            .ok_or_else(|| RosterError::NotFound("User".to_string()))
    }

    fn prepare(&self, request: UserCreate) -> Result<NewUser> {
        request.check().map_err(validation_error)?;
        Ok(NewUser {
            hashed_password: self.hash(&request.password)?,
            username: request.username,
            email: request.email,
            full_name: request.full_name.map(|name| name.trim().to_string()),
        })
    }

    fn hash(&self, password: &str) -> Result<String> {
        self.hasher
            .hash(password)
            .map_err(|e| RosterError::Other(anyhow::Error::new(e)))
    }
}
