//! User request and response models

use crate::auth::password::validate_password_rules;
use chrono::{DateTime, Utc};
use roster_core::{normalize_identifier, UserRecord};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use utoipa::{IntoParams, ToSchema};
use validator::{Validate, ValidationError, ValidationErrors};

pub const USERNAME_MIN_LEN: usize = 3;
pub const USERNAME_MAX_LEN: usize = 30;

/// New account
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct UserCreate {
    /// 3-30 characters of `a-z`, `0-9`, `.`, `_`, `-` (case-insensitive)
    #[schema(example = "alice")]
    pub username: String,
    #[validate(email)]
    #[schema(example = "alice@example.com")]
    pub email: String,
    /// 1-128 characters with letters and digits
    #[schema(example = "string1")]
    pub password: String,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
}

impl UserCreate {
    /// Run field validation, including rules the derive cannot express
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_default();
        check_username(&mut errors, &self.username);
        check_password(&mut errors, &self.password);
        check_full_name(&mut errors, self.full_name.as_deref());
        into_result(errors)
    }
}

/// Partial update; at least one field must be present
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
pub struct UserUpdate {
    pub username: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 255))]
    pub full_name: Option<String>,
    pub password: Option<String>,
}

impl UserUpdate {
    pub fn check(&self) -> Result<(), ValidationErrors> {
        let mut errors = self.validate().err().unwrap_or_default();
        if self.username.is_none()
            && self.email.is_none()
            && self.full_name.is_none()
            && self.password.is_none()
        {
            errors.add(
                "__all__",
                field_error("empty_update", "At least one field must be provided"),
            );
        }
        if let Some(username) = &self.username {
            check_username(&mut errors, username);
        }
        if let Some(password) = &self.password {
            check_password(&mut errors, password);
        }
        check_full_name(&mut errors, self.full_name.as_deref());
        into_result(errors)
    }
}

/// User as returned by the API; never includes the password hash
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserPublic {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub disabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<UserRecord> for UserPublic {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            username: record.username,
            email: record.email,
            full_name: record.full_name,
            disabled: record.disabled,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UsersList {
    pub users: Vec<UserPublic>,
}

impl From<Vec<UserRecord>> for UsersList {
    fn from(records: Vec<UserRecord>) -> Self {
        Self {
            users: records.into_iter().map(UserPublic::from).collect(),
        }
    }
}

/// Deleted user with a `deleted: true` marker
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserDeleted {
    #[serde(flatten)]
    pub user: UserPublic,
    pub deleted: bool,
}

/// `GET /users` filter
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct UsersQuery {
    /// Comma-separated user ids, e.g. `1,2,5`
    pub ids: Option<String>,
}

impl UsersQuery {
    /// Parsed id list; `None` means no filter
    pub fn parse_ids(&self) -> Result<Option<Vec<i64>>, ValidationErrors> {
        let Some(raw) = self.ids.as_deref().filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };

        let mut ids = Vec::new();
        for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            match part.parse::<i64>() {
                Ok(id) if id >= 1 => ids.push(id),
                _ => {
                    let mut errors = ValidationErrors::new();
                    errors.add("ids", field_error("invalid_id", "ids must be positive integers"));
                    return Err(errors);
                }
            }
        }
        Ok(Some(ids))
    }
}

fn check_username(errors: &mut ValidationErrors, raw: &str) {
    let username = normalize_identifier(raw);
    let len = username.chars().count();
    if !(USERNAME_MIN_LEN..=USERNAME_MAX_LEN).contains(&len) {
        errors.add(
            "username",
            field_error("length", "Username must be 3 to 30 characters long"),
        );
        return;
    }
    let allowed = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-".contains(c);
    if !username.chars().all(allowed) {
        errors.add(
            "username",
            field_error(
                "charset",
                "Username may contain only latin letters, digits, '.', '_' and '-'",
            ),
        );
    }
}

fn check_password(errors: &mut ValidationErrors, password: &str) {
    if let Err(reason) = validate_password_rules(password) {
        errors.add("password", field_error("password", reason));
    }
}

fn check_full_name(errors: &mut ValidationErrors, full_name: Option<&str>) {
    if matches!(full_name, Some(name) if name.trim().is_empty()) {
        errors.add("full_name", field_error("blank", "Full name must not be blank"));
    }
}

pub(crate) fn field_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

pub(crate) fn into_result(errors: ValidationErrors) -> Result<(), ValidationErrors> {
    if errors.errors().is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create(username: &str, password: &str) -> UserCreate {
        UserCreate {
            username: username.to_string(),
            email: "alice@example.com".to_string(),
            password: password.to_string(),
            full_name: None,
        }
    }

    #[test]
    fn test_valid_create() {
        assert!(create("Alice.B", "secret1").check().is_ok());
    }

    #[test]
    fn test_username_rules() {
        assert!(create("ab", "secret1").check().is_err());
        assert!(create(&"a".repeat(31), "secret1").check().is_err());
        assert!(create("alice smith", "secret1").check().is_err());
        assert!(create("алиса", "secret1").check().is_err());
        assert!(create("  bob  ", "secret1").check().is_ok());
    }

    #[test]
    fn test_password_and_email_rules() {
        let errors = create("alice", "onlyletters").check().unwrap_err();
        assert!(errors.errors().contains_key("password"));

        let mut bad_email = create("alice", "secret1");
        bad_email.email = "not-an-email".to_string();
        let errors = bad_email.check().unwrap_err();
        assert!(errors.errors().contains_key("email"));
    }

    #[test]
    fn test_blank_full_name() {
        let mut user = create("alice", "secret1");
        user.full_name = Some("   ".to_string());
        assert!(user.check().is_err());
    }

    #[test]
    fn test_empty_update_rejected() {
        assert!(UserUpdate::default().check().is_err());

        let update = UserUpdate {
            full_name: Some("Alice".to_string()),
            ..UserUpdate::default()
        };
        assert!(update.check().is_ok());
    }

    #[test]
    fn test_parse_ids() {
        let query = UsersQuery {
            ids: Some("1, 2,5".to_string()),
        };
        assert_eq!(query.parse_ids().unwrap(), Some(vec![1, 2, 5]));
        assert_eq!(UsersQuery::default().parse_ids().unwrap(), None);
        assert!(UsersQuery {
            ids: Some("1,x".to_string())
        }
        .parse_ids()
        .is_err());
    }

    #[test]
    fn test_deleted_flattens_user() {
        let deleted = UserDeleted {
            user: UserPublic {
                id: 1,
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                full_name: None,
                disabled: false,
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
            deleted: true,
        };
        let json = serde_json::to_value(&deleted).unwrap();
        assert_eq!(json["id"], 1);
        assert_eq!(json["deleted"], true);
    }
}
