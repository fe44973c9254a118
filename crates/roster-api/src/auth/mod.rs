//! Authentication module
//!
//! - Token encoding and decoding (`jwt`)
//! - Token pair issuance (`issuer`)
//! - Password hashing with Argon2 (`password`)
//! - Revocation ledger storage (`repository`)
//! - Login, refresh and revocation (`service`)
//! - The request gate (`middleware`)
//! - Background ledger pruning (`cleanup`)

pub mod cleanup;
pub mod error;
pub mod issuer;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;

pub use cleanup::RevocationPruner;
pub use error::AuthError;
pub use issuer::{TokenIssuer, TokenPair};
pub use jwt::{Claims, TokenCodec, TokenError, TokenPayload, TokenType};
pub use middleware::{auth_gate, AuthenticatedSubject, PublicRoutes};
pub use models::{
    AuthResponse, LoginForm, LoginRequest, LogoutRequest, MessageResponse, RefreshRequest,
};
pub use password::{CredentialHasher, PasswordConfig, PasswordError};
pub use repository::{
    MemoryRevocationLedger, PgRevocationLedger, RepositoryError, RevocationLedger,
};
pub use service::{AuthService, LoginOutcome, Rotation};
