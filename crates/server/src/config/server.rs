use serde::Deserialize;

/// HTTP server bind configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Path prefix for the admin API.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,
    /// Read timeout in seconds. No handler may block longer than
    /// read + write timeout.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,
    /// Write timeout in seconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout_seconds: u64,
    /// Graceful shutdown timeout in seconds: the maximum time to wait for
    /// in-flight requests to drain.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            api_prefix: default_api_prefix(),
            read_timeout_seconds: default_read_timeout(),
            write_timeout_seconds: default_write_timeout(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_owned()
}

fn default_port() -> u16 {
    8080
}

fn default_api_prefix() -> String {
    "/api/v1".to_owned()
}

fn default_read_timeout() -> u64 {
    15
}

fn default_write_timeout() -> u64 {
    15
}

fn default_shutdown_timeout() -> u64 {
    30
}
