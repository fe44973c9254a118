//! Password hashing and verification using Argon2id
//!
//! Hashes are stored in PHC string format, so verification reads the
//! algorithm, parameters and salt back out of the stored value.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2, Params,
};
use std::sync::Arc;
use thiserror::Error;

/// Longest accepted plaintext password
pub const MAX_PASSWORD_LEN: usize = 128;

// Hashed once per hasher for the unknown-login path.
const DUMMY_PASSWORD: &str = "roster-dummy-password-0";

/// Password hashing and verification errors
#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("Failed to hash password: {0}")]
    HashingFailed(String),

    #[error("Invalid password hash format")]
    InvalidHashFormat,
}

/// Argon2id cost parameters
#[derive(Debug, Clone)]
pub struct PasswordConfig {
    /// Memory cost in KiB (default: 19456 = 19 MiB)
    pub memory_cost: u32,
    /// Time cost (iterations, default: 2)
    pub time_cost: u32,
    /// Parallelism (lanes, default: 1)
    pub parallelism: u32,
    /// Output length in bytes (default: 32)
    pub output_len: Option<usize>,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            memory_cost: Params::DEFAULT_M_COST,
            time_cost: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
            output_len: Some(32),
        }
    }
}

impl PasswordConfig {
    /// Minimal cost, for tests and local tooling only
    pub fn light() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
            output_len: Some(32),
        }
    }

    fn to_params(&self) -> Result<Params, PasswordError> {
        Params::new(
            self.memory_cost,
            self.time_cost,
            self.parallelism,
            self.output_len,
        )
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))
    }
}

/// Hash a plaintext password with the default parameters
pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    hash_password_with_config(password, &PasswordConfig::default())
}

/// Hash a password with custom configuration
pub fn hash_password_with_config(
    password: &str,
    config: &PasswordConfig,
) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    let params = config.to_params()?;
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params);

    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| PasswordError::HashingFailed(e.to_string()))?;

    Ok(password_hash.to_string())
}

/// Verify a plaintext password against a stored hash
///
/// * `Ok(true)` - Password matches
/// * `Ok(false)` - Password does not match
/// * `Err(PasswordError)` - The stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, PasswordError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| PasswordError::InvalidHashFormat)?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(_) => Err(PasswordError::InvalidHashFormat),
    }
}

/// Account password rules
///
/// Between 1 and 128 characters, at least one letter and one digit,
/// no leading or trailing whitespace.
pub fn validate_password_rules(password: &str) -> Result<(), &'static str> {
    if password.is_empty() {
        return Err("Password must not be empty");
    }
    if password.chars().count() > MAX_PASSWORD_LEN {
        return Err("Password must be at most 128 characters long");
    }
    if password.trim() != password {
        return Err("Password must not start or end with whitespace");
    }
    if !password.chars().any(|c| c.is_alphabetic()) {
        return Err("Password must contain at least one letter");
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err("Password must contain at least one digit");
    }
    Ok(())
}

/// Hashes new passwords and verifies stored ones with one cost setting
#[derive(Debug, Clone)]
pub struct CredentialHasher {
    config: PasswordConfig,
    dummy_hash: Arc<str>,
}

impl CredentialHasher {
    pub fn new(config: PasswordConfig) -> Result<Self, PasswordError> {
        let dummy_hash = hash_password_with_config(DUMMY_PASSWORD, &config)?;
        Ok(Self {
            config,
            dummy_hash: dummy_hash.into(),
        })
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        hash_password_with_config(password, &self.config)
    }

    pub fn verify(&self, password: &str, hash: &str) -> Result<bool, PasswordError> {
        verify_password(password, hash)
    }

    /// Spend the same work as a real verification and discard the result
    ///
    /// Used when the login names no account, so that response time does
    /// not reveal which logins exist.
    pub fn verify_dummy(&self, password: &str) {
        let _ = verify_password(password, &self.dummy_hash);
    }
}
