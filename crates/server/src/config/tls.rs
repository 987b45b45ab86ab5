use serde::Deserialize;

/// TLS termination and ACME lifecycle configuration.
///
/// # Example
///
/// ```toml
/// [tls]
/// enabled = true
/// cert_path = "/etc/portcullis/tls/server.crt"
/// key_path = "/etc/portcullis/tls/server.key"
///
/// [tls.acme]
/// enabled = true
/// domains = ["gateway.example.com"]
/// contact_email = "ops@example.com"
/// ```
#[derive(Debug, Default, Deserialize)]
pub struct TlsConfig {
    /// Whether TLS (and therefore HTTP/2) is enabled.
    #[serde(default)]
    pub enabled: bool,
    /// Path to the server certificate chain PEM file.
    #[serde(default)]
    pub cert_path: Option<String>,
    /// Path to the server private key PEM file.
    #[serde(default)]
    pub key_path: Option<String>,
    /// ACME lifecycle hooks.
    #[serde(default)]
    pub acme: AcmeConfig,
}

/// ACME lifecycle settings.
///
/// Certificate procurement itself is an external collaborator that writes
/// renewed PEM files to `cert_path`/`key_path`; this config drives the
/// renewal watcher that hot-swaps them into the running listener.
#[derive(Debug, Default, Deserialize)]
pub struct AcmeConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Domains the certificate covers; informational for operators.
    #[serde(default)]
    pub domains: Vec<String>,
    /// Registration contact passed to the external ACME client.
    #[serde(default)]
    pub contact_email: Option<String>,
    /// Directory the external ACME client uses for its account/order cache.
    #[serde(default)]
    pub cache_dir: Option<String>,
    /// How often to check the certificate files for renewal, in seconds.
    #[serde(default = "default_renew_check")]
    pub renew_check_interval_seconds: u64,
}

fn default_renew_check() -> u64 {
    3600
}
