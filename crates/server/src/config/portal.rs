use serde::Deserialize;

/// Which portal repository backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortalBackend {
    /// In-memory repository for tests and single-node development.
    #[default]
    Memory,
    /// PostgreSQL (requires the `postgres` build feature).
    Postgres,
}

/// Developer-portal repository and token settings.
#[derive(Debug, Default, Deserialize)]
pub struct PortalConfig {
    #[serde(default)]
    pub backend: PortalBackend,
    #[serde(default)]
    pub postgres: PostgresSettings,
    #[serde(default)]
    pub jwt: JwtConfig,
    /// Minimum accepted password length at registration.
    #[serde(default = "default_min_password")]
    pub min_password_length: usize,
}

/// PostgreSQL connection settings for the portal repository.
#[derive(Debug, Deserialize)]
pub struct PostgresSettings {
    #[serde(default = "default_pg_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

impl Default for PostgresSettings {
    fn default() -> Self {
        Self {
            url: default_pg_url(),
            pool_size: default_pool_size(),
        }
    }
}

/// Token issuance settings shared by the portal and the admin login.
#[derive(Debug, Deserialize)]
pub struct JwtConfig {
    /// HS256 signing secret.
    #[serde(default = "default_jwt_secret")]
    pub secret: String,
    /// Required issuer claim.
    #[serde(default = "default_jwt_issuer")]
    pub issuer: String,
    /// Token lifetime in seconds.
    #[serde(default = "default_jwt_lifetime")]
    pub lifetime_seconds: i64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: default_jwt_secret(),
            issuer: default_jwt_issuer(),
            lifetime_seconds: default_jwt_lifetime(),
        }
    }
}

fn default_min_password() -> usize {
    8
}

fn default_pg_url() -> String {
    "postgres://localhost/portcullis".to_owned()
}

fn default_pool_size() -> u32 {
    8
}

fn default_jwt_secret() -> String {
    // Development fallback; deployments set their own.
    "portcullis-dev-secret".to_owned()
}

fn default_jwt_issuer() -> String {
    "portcullis".to_owned()
}

fn default_jwt_lifetime() -> i64 {
    86_400
}
