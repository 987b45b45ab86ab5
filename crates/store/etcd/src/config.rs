use std::time::Duration;

/// Configuration for the etcd store backend.
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    /// etcd endpoint URLs (e.g. `["http://localhost:2379"]`).
    pub endpoints: Vec<String>,

    /// Key prefix applied to every etcd key to avoid collisions.
    pub prefix: String,

    /// Timeout for establishing a connection to etcd.
    pub connect_timeout: Duration,

    /// Per-operation timeout.
    pub op_timeout: Duration,
}

impl Default for EtcdConfig {
    fn default() -> Self {
        Self {
            endpoints: vec![String::from("http://localhost:2379")],
            prefix: String::from("portcullis"),
            connect_timeout: Duration::from_secs(5),
            op_timeout: Duration::from_secs(5),
        }
    }
}

impl EtcdConfig {
    /// Build the full etcd key for a logical store key.
    ///
    /// Format: `{prefix}/{key}`
    pub(crate) fn render_key(&self, key: &str) -> String {
        format!("{}/{key}", self.prefix)
    }

    /// Strip the configured prefix from a raw etcd key.
    pub(crate) fn strip_key<'a>(&self, raw: &'a str) -> &'a str {
        raw.strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(raw)
    }
}
