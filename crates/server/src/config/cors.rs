use serde::Deserialize;

/// CORS policy for the portal API.
#[derive(Debug, Deserialize)]
pub struct CorsConfig {
    /// When false, no CORS headers are emitted.
    #[serde(default)]
    pub enabled: bool,
    /// Allowed origins; `["*"]` allows any origin.
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
    /// Allowed methods.
    #[serde(default = "default_methods")]
    pub allowed_methods: Vec<String>,
    /// Allowed request headers.
    #[serde(default = "default_headers")]
    pub allowed_headers: Vec<String>,
    /// Response headers exposed to the browser.
    #[serde(default)]
    pub expose_headers: Vec<String>,
    /// Whether credentials are allowed. Ignored with wildcard origins.
    #[serde(default)]
    pub allow_credentials: bool,
    /// Preflight cache lifetime in seconds.
    #[serde(default = "default_max_age")]
    pub max_age_seconds: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            allowed_origins: default_origins(),
            allowed_methods: default_methods(),
            allowed_headers: default_headers(),
            expose_headers: Vec::new(),
            allow_credentials: false,
            max_age_seconds: default_max_age(),
        }
    }
}

fn default_origins() -> Vec<String> {
    vec!["*".to_owned()]
}

fn default_methods() -> Vec<String> {
    ["GET", "POST", "PUT", "DELETE", "OPTIONS"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_headers() -> Vec<String> {
    ["authorization", "content-type"]
        .into_iter()
        .map(str::to_owned)
        .collect()
}

fn default_max_age() -> u64 {
    3600
}
