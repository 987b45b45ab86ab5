pub mod api_key;
pub mod jwt;
pub mod middleware;
pub mod password;

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::info;

use portcullis_core::{ControlError, UserRole};

use crate::config::AuthConfig;

use self::api_key::{ApiKeyEntry, authenticate_api_key, build_api_key_table, hash_api_key};
use self::jwt::{JwtManager, TokenScope};

/// Authenticated admin caller attached to requests as an extension.
#[derive(Debug, Clone)]
pub struct AdminIdentity {
    /// Admin username or API key name.
    pub id: String,
    /// `"jwt"`, `"api_key"`, or `"anonymous"` (auth disabled).
    pub auth_method: &'static str,
}

impl AdminIdentity {
    /// Identity used when auth is disabled.
    #[must_use]
    pub fn anonymous() -> Self {
        Self {
            id: String::new(),
            auth_method: "anonymous",
        }
    }
}

/// A masked view of an admin API key for listings.
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ApiKeySummary {
    pub name: String,
    /// First 8 hex chars of the key digest; enough to correlate, useless
    /// to authenticate.
    pub digest_prefix: String,
}

struct AdminUserEntry {
    password_hash: String,
}

/// Admin authentication: config-file users (JWT login) plus bearer API
/// keys looked up by SHA-256 digest.
///
/// Keys minted at runtime live in the in-process table only; the config
/// file is the durable set.
pub struct AdminAuthProvider {
    jwt: Arc<JwtManager>,
    users: HashMap<String, AdminUserEntry>,
    keys: RwLock<HashMap<String, ApiKeyEntry>>,
}

impl AdminAuthProvider {
    pub fn new(config: &AuthConfig, jwt: Arc<JwtManager>) -> Self {
        let users = config
            .admins
            .iter()
            .map(|u| {
                (
                    u.username.clone(),
                    AdminUserEntry {
                        password_hash: u.password_hash.clone(),
                    },
                )
            })
            .collect();

        let keys = build_api_key_table(&config.api_keys);
        info!(
            admins = config.admins.len(),
            api_keys = keys.len(),
            "admin auth tables loaded"
        );

        Self {
            jwt,
            users,
            keys: RwLock::new(keys),
        }
    }

    /// Authenticate an admin by username/password and issue an admin JWT.
    ///
    /// Every failure is the same opaque credential error.
    pub fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, DateTime<Utc>), ControlError> {
        let user = self.users.get(username).ok_or(ControlError::Unauthorized)?;
        if !password::verify_password(&user.password_hash, password) {
            return Err(ControlError::Unauthorized);
        }
        self.jwt
            .issue(username, "", UserRole::Admin, TokenScope::Admin)
    }

    /// Resolve a bearer credential: admin JWT first, then API key digest.
    pub async fn authenticate_bearer(&self, credential: &str) -> Option<AdminIdentity> {
        if let Ok(claims) = self.jwt.validate(credential, TokenScope::Admin) {
            return Some(AdminIdentity {
                id: claims.sub,
                auth_method: "jwt",
            });
        }

        let keys = self.keys.read().await;
        authenticate_api_key(credential, &keys).map(|entry| AdminIdentity {
            id: entry.name.clone(),
            auth_method: "api_key",
        })
    }

    /// Mint a new API key. The plaintext is returned exactly once; only
    /// the digest is stored.
    pub async fn mint_key(&self, name: &str) -> String {
        let raw = format!("pk_{}", uuid::Uuid::new_v4().simple());
        let mut keys = self.keys.write().await;
        keys.insert(hash_api_key(&raw), ApiKeyEntry {
            name: name.to_owned(),
        });
        info!(name, "admin api key minted");
        raw
    }

    /// Masked listing of all known keys.
    pub async fn list_keys(&self) -> Vec<ApiKeySummary> {
        let keys = self.keys.read().await;
        let mut summaries: Vec<ApiKeySummary> = keys
            .iter()
            .map(|(digest, entry)| ApiKeySummary {
                name: entry.name.clone(),
                digest_prefix: digest.chars().take(8).collect(),
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }
}
