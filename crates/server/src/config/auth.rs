use serde::Deserialize;

/// Admin authentication configuration.
#[derive(Debug, Default, Deserialize)]
pub struct AuthConfig {
    /// When false, the admin API runs unauthenticated (development only).
    #[serde(default)]
    pub enabled: bool,
    /// Admin console users (argon2 password hashes).
    #[serde(default)]
    pub admins: Vec<AdminUserConfig>,
    /// Static admin API keys.
    #[serde(default)]
    pub api_keys: Vec<AdminApiKeyConfig>,
}

/// One admin console user.
#[derive(Debug, Deserialize)]
pub struct AdminUserConfig {
    pub username: String,
    /// Argon2 hash string; never the plaintext.
    pub password_hash: String,
}

/// One static admin API key.
///
/// Provide `key_hash` (lowercase hex SHA-256 of the raw key) in production;
/// `key` carries the raw key for development setups.
#[derive(Debug, Deserialize)]
pub struct AdminApiKeyConfig {
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub key_hash: Option<String>,
}
