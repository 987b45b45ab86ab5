use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::AdminApiKeyConfig;

/// An entry in the admin API key lookup table.
#[derive(Debug, Clone)]
pub struct ApiKeyEntry {
    pub name: String,
}

/// Build an in-memory lookup from `sha256_hex(raw_key) -> ApiKeyEntry`.
///
/// The config may carry either a pre-computed SHA-256 hash (`key_hash`) or,
/// for development setups, the raw key (`key`), which is hashed on load.
pub fn build_api_key_table(configs: &[AdminApiKeyConfig]) -> HashMap<String, ApiKeyEntry> {
    let mut map = HashMap::new();
    for cfg in configs {
        let hash = match (&cfg.key_hash, &cfg.key) {
            (Some(hash), _) => hash.to_lowercase(),
            (None, Some(raw)) => hash_api_key(raw),
            (None, None) => continue,
        };
        map.insert(hash, ApiKeyEntry {
            name: cfg.name.clone(),
        });
    }
    map
}

/// Hash a raw API key to the lookup format (lowercase hex SHA-256).
#[must_use]
pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    hex::encode(hasher.finalize())
}

/// Look up an API key entry by raw key.
#[allow(clippy::implicit_hasher)]
#[must_use]
pub fn authenticate_api_key<'a>(
    raw_key: &str,
    table: &'a HashMap<String, ApiKeyEntry>,
) -> Option<&'a ApiKeyEntry> {
    table.get(&hash_api_key(raw_key))
}
