mod auth;
mod background;
mod cors;
mod dataplane;
mod portal;
mod server;
mod store;
mod tls;

#[cfg(test)]
mod tests;

pub use auth::*;
pub use background::*;
pub use cors::*;
pub use dataplane::*;
pub use portal::*;
pub use server::*;
pub use store::*;
pub use tls::*;

use serde::Deserialize;

/// Top-level configuration for the Portcullis server, loaded from a TOML
/// file (`portcullis.toml` by default).
#[derive(Debug, Default, Deserialize)]
pub struct PortcullisConfig {
    /// HTTP server bind configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Configuration store backend.
    #[serde(default)]
    pub store: StoreConfig,
    /// Developer-portal repository and token settings.
    #[serde(default)]
    pub portal: PortalConfig,
    /// Data-plane admin client.
    #[serde(default)]
    pub dataplane: DataplaneConfig,
    /// Admin authentication.
    #[serde(default)]
    pub auth: AuthConfig,
    /// Portal CORS policy.
    #[serde(default)]
    pub cors: CorsConfig,
    /// TLS termination and ACME lifecycle.
    #[serde(default)]
    pub tls: TlsConfig,
    /// GitOps sync and reconciliation workers.
    #[serde(default)]
    pub background: BackgroundConfig,
}
