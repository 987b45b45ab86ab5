//! Key namespace shared by the control plane and its subscribers.

/// Prefix for route entries.
pub const ROUTES: &str = "routes/";
/// Prefix for upstream entries.
pub const UPSTREAMS: &str = "upstreams/";
/// Prefix for plugin entries.
pub const PLUGINS: &str = "plugins/";
/// Prefix for configuration versions.
pub const VERSIONS: &str = "versions/";
/// Reserved key holding the notifier's persisted sequence high-water mark.
pub const NOTIFIER_SEQ: &str = "notifier/seq";

#[must_use]
pub fn route_key(id: &str) -> String {
    format!("{ROUTES}{id}")
}

#[must_use]
pub fn upstream_key(id: &str) -> String {
    format!("{UPSTREAMS}{id}")
}

#[must_use]
pub fn plugin_key(id: &str) -> String {
    format!("{PLUGINS}{id}")
}

#[must_use]
pub fn version_key(id: &str) -> String {
    format!("{VERSIONS}{id}")
}

/// Split a key into `(prefix, id)` if it belongs to a known entity prefix.
#[must_use]
pub fn split_entity_key(key: &str) -> Option<(&'static str, &str)> {
    for prefix in [ROUTES, UPSTREAMS, PLUGINS, VERSIONS] {
        if let Some(id) = key.strip_prefix(prefix) {
            return Some((prefix, id));
        }
    }
    None
}
