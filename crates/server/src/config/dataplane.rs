use serde::Deserialize;

/// Data-plane admin client settings.
///
/// Setting `admin_url` to the `mock://` sentinel selects the in-process
/// deterministic client instead of HTTP.
#[derive(Debug, Deserialize)]
pub struct DataplaneConfig {
    /// Base URL of the data-plane admin surface.
    #[serde(default = "default_admin_url")]
    pub admin_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Bearer key for the data-plane admin surface, if it requires one.
    #[serde(default)]
    pub admin_key: Option<String>,
}

impl Default for DataplaneConfig {
    fn default() -> Self {
        Self {
            admin_url: default_admin_url(),
            timeout_seconds: default_timeout(),
            admin_key: None,
        }
    }
}

fn default_admin_url() -> String {
    "mock://".to_owned()
}

fn default_timeout() -> u64 {
    10
}
