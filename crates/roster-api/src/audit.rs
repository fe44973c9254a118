//! Security audit logging for authentication events
//!
//! Every event is logged at INFO with the `audit` target so it can be
//! filtered and routed separately from application logs. Events never
//! carry tokens or passwords, only token ids and subjects.
//!
//! ```ignore
//! use roster_api::audit::{audit_log, AuditEvent};
//!
//! audit_log(&AuditEvent::LoginSuccess {
//!     user_id: user.id,
//!     username: user.username.clone(),
//!     ip_address: extract_ip_address(&headers),
//!     user_agent: extract_user_agent(&headers),
//! });
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use axum::http::{header, HeaderMap};
use tracing::{info, warn};

/// Security audit events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    LoginSuccess {
        user_id: i64,
        username: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    LoginFailure {
        login: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RegistrationSuccess {
        user_id: i64,
        username: String,
        ip_address: Option<String>,
    },

    RegistrationFailure {
        username: String,
        reason: String,
        ip_address: Option<String>,
    },

    /// A refresh token was exchanged for a new pair
    TokenRefresh {
        subject: String,
        ip_address: Option<String>,
    },

    TokenRefreshFailure {
        reason: String,
        ip_address: Option<String>,
    },

    /// A refresh token was recorded in the revocation ledger (logout)
    TokenRevoked {
        subject: String,
        token_id: String,
        ip_address: Option<String>,
    },

    /// The request gate rejected a bearer token
    InvalidToken {
        path: String,
        reason: String,
        ip_address: Option<String>,
        user_agent: Option<String>,
    },

    RevocationPruned {
        removed: u64,
    },
}

impl AuditEvent {
    /// Stable event name, matching the serialized `event_type`
    pub fn kind(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "login_success",
            AuditEvent::LoginFailure { .. } => "login_failure",
            AuditEvent::RegistrationSuccess { .. } => "registration_success",
            AuditEvent::RegistrationFailure { .. } => "registration_failure",
            AuditEvent::TokenRefresh { .. } => "token_refresh",
            AuditEvent::TokenRefreshFailure { .. } => "token_refresh_failure",
            AuditEvent::TokenRevoked { .. } => "token_revoked",
            AuditEvent::InvalidToken { .. } => "invalid_token",
            AuditEvent::RevocationPruned { .. } => "revocation_pruned",
        }
    }

    fn summary(&self) -> &'static str {
        match self {
            AuditEvent::LoginSuccess { .. } => "Login successful",
            AuditEvent::LoginFailure { .. } => "Login failed",
            AuditEvent::RegistrationSuccess { .. } => "Registration successful",
            AuditEvent::RegistrationFailure { .. } => "Registration failed",
            AuditEvent::TokenRefresh { .. } => "Token refresh",
            AuditEvent::TokenRefreshFailure { .. } => "Token refresh rejected",
            AuditEvent::TokenRevoked { .. } => "Refresh token revoked",
            AuditEvent::InvalidToken { .. } => "Invalid token",
            AuditEvent::RevocationPruned { .. } => "Revocation ledger pruned",
        }
    }

    pub fn ip_address(&self) -> Option<&str> {
        match self {
            AuditEvent::LoginSuccess { ip_address, .. }
            | AuditEvent::LoginFailure { ip_address, .. }
            | AuditEvent::RegistrationSuccess { ip_address, .. }
            | AuditEvent::RegistrationFailure { ip_address, .. }
            | AuditEvent::TokenRefresh { ip_address, .. }
            | AuditEvent::TokenRefreshFailure { ip_address, .. }
            | AuditEvent::TokenRevoked { ip_address, .. }
            | AuditEvent::InvalidToken { ip_address, .. } => ip_address.as_deref(),
            AuditEvent::RevocationPruned { .. } => None,
        }
    }
}

/// Log an audit event at INFO under the `audit` target
///
/// The full event goes into the `details` field as JSON.
pub fn audit_log(event: &AuditEvent) {
    let details = match serde_json::to_string(event) {
        Ok(json) => json,
        Err(e) => {
            warn!(target: "audit", event = event.kind(), error = %e, "Failed to serialize audit event");
            return;
        }
    };

    info!(
        target: "audit",
        timestamp = %Utc::now(),
        event = event.kind(),
        ip_address = event.ip_address().unwrap_or("-"),
        details = %details,
        "{}",
        event.summary()
    );
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Client IP from proxy headers
///
/// The first `X-Forwarded-For` hop wins over `X-Real-IP`. Connection info
/// is not available here, so a direct client yields `None`.
pub fn extract_ip_address(headers: &HeaderMap) -> Option<String> {
    header_str(headers, "x-forwarded-for")
        .and_then(|forwarded| forwarded.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .or_else(|| header_str(headers, "x-real-ip"))
        .map(str::to_string)
}

pub fn extract_user_agent(headers: &HeaderMap) -> Option<String> {
    header_str(headers, header::USER_AGENT.as_str()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::TokenRevoked {
            subject: "42".to_string(),
            token_id: "0f3c".to_string(),
            ip_address: None,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"token_revoked\""));
        assert!(json.contains("0f3c"));
    }

    #[test]
    fn test_kind_matches_serialized_tag() {
        let event = AuditEvent::InvalidToken {
            path: "/api/v1/users".to_string(),
            reason: "TOKEN_EXPIRED".to_string(),
            ip_address: Some("10.0.0.1".to_string()),
            user_agent: None,
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], event.kind());
        assert_eq!(event.ip_address(), Some("10.0.0.1"));
    }

    #[test]
    fn test_audit_log_does_not_panic() {
        audit_log(&AuditEvent::LoginFailure {
            login: "alice".to_string(),
            reason: "INVALID_CREDENTIALS".to_string(),
            ip_address: Some("192.168.1.1".to_string()),
            user_agent: None,
        });
        audit_log(&AuditEvent::RevocationPruned { removed: 3 });
    }

    #[test]
    fn test_extract_ip_from_x_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            "203.0.113.1, 198.51.100.1".parse().unwrap(),
        );

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_extract_ip_from_x_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", "203.0.113.1".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("203.0.113.1".to_string()));
    }

    #[test]
    fn test_empty_forwarded_for_falls_back() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", " ".parse().unwrap());
        headers.insert("x-real-ip", "198.51.100.7".parse().unwrap());

        assert_eq!(extract_ip_address(&headers), Some("198.51.100.7".to_string()));
    }

    #[test]
    fn test_extract_missing_headers() {
        let headers = HeaderMap::new();

        assert_eq!(extract_ip_address(&headers), None);
        assert_eq!(extract_user_agent(&headers), None);
    }
}
