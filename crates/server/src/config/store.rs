use serde::Deserialize;

/// Which store backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// In-memory store for tests and single-node development.
    #[default]
    Memory,
    /// etcd, the primary linearizable backend.
    Etcd,
}

/// Configuration store backend selection.
#[derive(Debug, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub etcd: EtcdSettings,
}

/// etcd connection settings.
#[derive(Debug, Deserialize)]
pub struct EtcdSettings {
    /// Endpoint URLs.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<String>,
    /// Key prefix applied to every key.
    #[serde(default = "default_prefix")]
    pub prefix: String,
    /// Connect timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// Per-operation timeout in seconds.
    #[serde(default = "default_op_timeout")]
    pub op_timeout_seconds: u64,
}

impl Default for EtcdSettings {
    fn default() -> Self {
        Self {
            endpoints: default_endpoints(),
            prefix: default_prefix(),
            connect_timeout_seconds: default_connect_timeout(),
            op_timeout_seconds: default_op_timeout(),
        }
    }
}

fn default_endpoints() -> Vec<String> {
    vec!["http://localhost:2379".to_owned()]
}

fn default_prefix() -> String {
    "portcullis".to_owned()
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_op_timeout() -> u64 {
    5
}
