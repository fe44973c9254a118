//! Request gate
//!
//! Every request passes through [`auth_gate`]. Allow-listed paths and
//! `OPTIONS` preflights go straight through; everything else needs an
//! `Authorization: Bearer <access token>` header. On success the subject
//! is added to request extensions as [`AuthenticatedSubject`].

use super::error::AuthError;
use super::jwt::TokenPayload;
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use roster_core::ServerConfig;
use std::collections::HashSet;
use std::sync::Arc;

/// Paths that never require a token
pub const DEFAULT_PUBLIC_PATHS: &[&str] =
    &["/health", "/ready", "/docs", "/openapi.json", "/favicon.ico"];

/// Path prefixes that never require a token
pub const DEFAULT_PUBLIC_PREFIXES: &[&str] = &["/api/v1/auth", "/docs/"];

/// Subject bound to a request that passed the gate
///
/// Extract in handlers with `Extension<AuthenticatedSubject>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedSubject {
    pub subject: String,
    pub token_id: String,
    pub scope: Option<String>,
}

impl AuthenticatedSubject {
    /// Subject as a numeric user id
    pub fn user_id(&self) -> Result<i64, AuthError> {
        self.subject
            .parse()
            .map_err(|_| AuthError::invalid("subject is not a user id"))
    }
}

impl From<TokenPayload> for AuthenticatedSubject {
    fn from(payload: TokenPayload) -> Self {
        Self {
            subject: payload.subject().to_string(),
            token_id: payload.token_id().to_string(),
            scope: payload.scope().map(str::to_string),
        }
    }
}

/// Allow-list of paths that bypass the gate
#[derive(Debug, Clone)]
pub struct PublicRoutes {
    exact: HashSet<String>,
    prefixes: Vec<String>,
}

impl Default for PublicRoutes {
    fn default() -> Self {
        Self::new(std::iter::empty::<String>(), std::iter::empty::<String>())
    }
}

impl PublicRoutes {
    /// Defaults plus the given extras
    pub fn new<P, Q>(extra_paths: P, extra_prefixes: Q) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        Q: IntoIterator,
        Q::Item: Into<String>,
    {
        let exact = DEFAULT_PUBLIC_PATHS
            .iter()
            .map(|p| p.to_string())
            .chain(extra_paths.into_iter().map(Into::into))
            .collect();
        let prefixes = DEFAULT_PUBLIC_PREFIXES
            .iter()
            .map(|p| p.to_string())
            .chain(extra_prefixes.into_iter().map(Into::into))
            .collect();

        Self { exact, prefixes }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.public_paths.iter().cloned(),
            config.public_prefixes.iter().cloned(),
        )
    }

    /// A prefix matches whole path segments: `/api/v1/auth` covers
    /// `/api/v1/auth/login` but not `/api/v1/authors`. A prefix ending
    /// in `/` matches anything below it.
    pub fn is_public(&self, path: &str) -> bool {
        if self.exact.contains(path) {
            return true;
        }
        self.prefixes.iter().any(|prefix| {
            path.strip_prefix(prefix.as_str()).is_some_and(|rest| {
                prefix.ends_with('/') || rest.is_empty() || rest.starts_with('/')
            })
        })
    }
}

/// Bearer token from the `Authorization` header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::NotAuthenticated)?
        .to_str()
        .map_err(|_| AuthError::NotAuthenticated)?;

    let token = value
        .strip_prefix("Bearer ")
        .ok_or(AuthError::NotAuthenticated)?
        .trim();

    if token.is_empty() {
        return Err(AuthError::NotAuthenticated);
    }
    Ok(token)
}

/// Authentication middleware applied to the whole router
///
/// ```ignore
/// let app = Router::new()
///     .nest("/api/v1", api_routes())
///     .layer(middleware::from_fn_with_state(state.clone(), auth_gate));
/// ```
pub async fn auth_gate(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    if request.method() == Method::OPTIONS || state.public_routes.is_public(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = bearer_token(request.headers())?;

    let payload = match state.auth.decode_access(token) {
        Ok(payload) => payload,
        Err(e) => {
            audit_log(&AuditEvent::InvalidToken {
                path: request.uri().path().to_string(),
                reason: e.code().to_string(),
                ip_address: extract_ip_address(request.headers()),
                user_agent: extract_user_agent(request.headers()),
            });
            return Err(e);
        }
    };

    request
        .extensions_mut()
        .insert(AuthenticatedSubject::from(payload));

    Ok(next.run(request).await)
}
