use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Portal account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum UserRole {
    Admin,
    Developer,
    Viewer,
}

impl UserRole {
    /// Parse a role from a string, case-insensitively.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "admin" => Some(Self::Admin),
            "developer" => Some(Self::Developer),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Admin => f.write_str("admin"),
            Self::Developer => f.write_str("developer"),
            Self::Viewer => f.write_str("viewer"),
        }
    }
}

/// Lifecycle status shared by portal users and applications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum AccountStatus {
    Active,
    Inactive,
    Suspended,
}

impl AccountStatus {
    /// Parse a status from a string, case-insensitively.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "active" => Some(Self::Active),
            "inactive" => Some(Self::Inactive),
            "suspended" => Some(Self::Suspended),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active => f.write_str("active"),
            Self::Inactive => f.write_str("inactive"),
            Self::Suspended => f.write_str("suspended"),
        }
    }
}

/// A developer-portal account.
///
/// The password is only ever stored as an adaptive-cost hash; the plaintext
/// never leaves the registration/login handlers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct User {
    pub id: String,
    /// Unique across all users.
    pub email: String,
    pub name: String,
    /// Argon2 hash string; never serialized to API responses.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub role: UserRole,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Minimal email shape check: one `@` with non-empty local and domain
    /// parts, and a dot somewhere in the domain.
    pub fn validate_email(email: &str) -> Result<(), ControlError> {
        let Some((local, domain)) = email.split_once('@') else {
            return Err(ControlError::Validation("invalid email address".into()));
        };
        if local.is_empty() || domain.is_empty() || !domain.contains('.') || email.contains(' ') {
            return Err(ControlError::Validation("invalid email address".into()));
        }
        Ok(())
    }
}

/// A portal application; each one maps 1:1 to a data-plane consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Application {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Owning portal user.
    pub user_id: String,
    /// Unique across all applications.
    pub api_key: String,
    /// Never serialized to API responses after creation.
    #[serde(skip_serializing, default)]
    pub api_secret: String,
    pub status: AccountStatus,
    /// Requests per minute granted to this application; 0 means unlimited.
    #[serde(default)]
    pub rate_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    /// Structural validation.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.name.trim().is_empty() {
            return Err(ControlError::Validation(
                "application name is required".into(),
            ));
        }
        if self.rate_limit < 0 {
            return Err(ControlError::Validation(
                "application rate_limit must not be negative".into(),
            ));
        }
        Ok(())
    }
}
