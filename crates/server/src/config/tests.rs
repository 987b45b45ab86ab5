use super::*;

#[test]
fn empty_toml_yields_defaults() {
    let config: PortcullisConfig = toml::from_str("").unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.server.api_prefix, "/api/v1");
    assert_eq!(config.store.backend, StoreBackend::Memory);
    assert_eq!(config.portal.backend, PortalBackend::Memory);
    assert_eq!(config.dataplane.admin_url, "mock://");
    assert!(!config.auth.enabled);
    assert!(!config.tls.enabled);
    assert!(!config.background.sync.enabled);
}

#[test]
fn full_toml_parses() {
    let raw = r#"
[server]
host = "0.0.0.0"
port = 9443
api_prefix = "/admin/v2"

[store]
backend = "etcd"

[store.etcd]
endpoints = ["http://etcd-0:2379", "http://etcd-1:2379"]
prefix = "gw"

[portal]
backend = "postgres"
min_password_length = 12

[portal.postgres]
url = "postgres://portal@db/portal"
pool_size = 16

[portal.jwt]
secret = "s3cret"
issuer = "gateway.example.com"
lifetime_seconds = 7200

[dataplane]
admin_url = "http://dataplane:8001"
admin_key = "dp-admin"

[auth]
enabled = true

[[auth.admins]]
username = "root"
password_hash = "$argon2id$v=19$m=19456,t=2,p=1$abc$def"

[[auth.api_keys]]
name = "ci"
key_hash = "deadbeef"

[cors]
enabled = true
allowed_origins = ["https://portal.example.com"]
allow_credentials = true

[tls]
enabled = true
cert_path = "/etc/tls/cert.pem"
key_path = "/etc/tls/key.pem"

[tls.acme]
enabled = true
domains = ["gateway.example.com"]
contact_email = "ops@example.com"

[background]
reconcile_interval_seconds = 30
drift_interval_seconds = 120

[background.sync]
enabled = true
path = "/etc/portcullis/gateway.yaml"
poll_interval_seconds = 15
"#;

    let config: PortcullisConfig = toml::from_str(raw).unwrap();
    assert_eq!(config.server.port, 9443);
    assert_eq!(config.store.backend, StoreBackend::Etcd);
    assert_eq!(config.store.etcd.endpoints.len(), 2);
    assert_eq!(config.portal.backend, PortalBackend::Postgres);
    assert_eq!(config.portal.min_password_length, 12);
    assert_eq!(config.portal.jwt.issuer, "gateway.example.com");
    assert_eq!(config.dataplane.admin_key.as_deref(), Some("dp-admin"));
    assert_eq!(config.auth.admins.len(), 1);
    assert_eq!(config.auth.api_keys[0].key_hash.as_deref(), Some("deadbeef"));
    assert_eq!(config.cors.allowed_origins, vec!["https://portal.example.com"]);
    assert!(config.tls.acme.enabled);
    assert_eq!(config.background.sync.poll_interval_seconds, 15);
}
