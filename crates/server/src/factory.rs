//! Backend factories: turn configuration into live store, portal, and
//! data-plane instances.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use portcullis_dataplane::{
    DataplaneClient, HttpDataplaneClientBuilder, MOCK_URL_SCHEME, MockDataplaneClient,
};
use portcullis_portal::{MemoryPortalRepository, PortalRepository};
use portcullis_store::ConfigStore;
use portcullis_store_etcd::{EtcdConfig, EtcdConfigStore};
use portcullis_store_memory::MemoryConfigStore;

use crate::config::{DataplaneConfig, PortalBackend, PortalConfig, StoreBackend, StoreConfig};

/// Create the configuration store selected by config.
pub async fn create_store(config: &StoreConfig) -> Result<Arc<dyn ConfigStore>, String> {
    match config.backend {
        StoreBackend::Memory => {
            info!("using in-memory configuration store");
            Ok(Arc::new(MemoryConfigStore::new()))
        }
        StoreBackend::Etcd => {
            let etcd = EtcdConfigStore::new(EtcdConfig {
                endpoints: config.etcd.endpoints.clone(),
                prefix: config.etcd.prefix.clone(),
                connect_timeout: Duration::from_secs(config.etcd.connect_timeout_seconds),
                op_timeout: Duration::from_secs(config.etcd.op_timeout_seconds),
            })
            .await
            .map_err(|e| format!("etcd store initialization failed: {e}"))?;
            info!(endpoints = ?config.etcd.endpoints, "etcd configuration store connected");
            Ok(Arc::new(etcd))
        }
    }
}

/// Create the portal repository selected by config.
pub async fn create_portal(config: &PortalConfig) -> Result<Arc<dyn PortalRepository>, String> {
    match config.backend {
        PortalBackend::Memory => {
            info!("using in-memory portal repository");
            Ok(Arc::new(MemoryPortalRepository::new()))
        }
        #[cfg(feature = "postgres")]
        PortalBackend::Postgres => {
            let repo = portcullis_portal::PostgresPortalRepository::new(
                portcullis_portal::PostgresConfig {
                    url: config.postgres.url.clone(),
                    pool_size: config.postgres.pool_size,
                },
            )
            .await
            .map_err(|e| format!("postgres portal repository initialization failed: {e}"))?;
            info!("postgres portal repository connected");
            Ok(Arc::new(repo))
        }
        #[cfg(not(feature = "postgres"))]
        PortalBackend::Postgres => Err(
            "portal backend 'postgres' requires building with the `postgres` feature".to_owned(),
        ),
    }
}

/// Create the data-plane client. The `mock://` sentinel selects the
/// deterministic in-process client.
pub fn create_dataplane(config: &DataplaneConfig) -> Result<Arc<dyn DataplaneClient>, String> {
    if config.admin_url.starts_with(MOCK_URL_SCHEME) {
        info!("using mock data-plane client");
        return Ok(Arc::new(MockDataplaneClient::new()));
    }

    let mut builder = HttpDataplaneClientBuilder::new(&config.admin_url)
        .timeout(Duration::from_secs(config.timeout_seconds));
    if let Some(key) = &config.admin_key {
        builder = builder.admin_key(key);
    }
    let client = builder
        .build()
        .map_err(|e| format!("data-plane client initialization failed: {e}"))?;
    info!(url = %config.admin_url, "data-plane client configured");
    Ok(Arc::new(client))
}
