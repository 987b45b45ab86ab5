mod error;
mod http;
mod mock;

pub use error::DataplaneError;
pub use http::{HttpDataplaneClient, HttpDataplaneClientBuilder};
pub use mock::MockDataplaneClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Sentinel URL scheme that selects the in-process mock client.
pub const MOCK_URL_SCHEME: &str = "mock://";

/// A data-plane identity mirroring one portal application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consumer {
    /// Consumer id; always equal to the owning application's id.
    pub id: String,
    /// Display name shown in the data-plane admin surface.
    pub username: String,
}

/// Client for the data-plane admin surface.
///
/// All implementations retry transient failures internally; an error from
/// any method means the operation did not take effect remotely (or its
/// status is unknown and the drift reconciler will repair it).
#[async_trait]
pub trait DataplaneClient: Send + Sync {
    async fn create_consumer(&self, consumer: &Consumer) -> Result<(), DataplaneError>;

    async fn delete_consumer(&self, id: &str) -> Result<(), DataplaneError>;

    /// Register `api_key` as a credential of `consumer_id`. The control
    /// plane generates key material; the data plane only stores it.
    async fn generate_api_key(&self, consumer_id: &str, api_key: &str)
    -> Result<(), DataplaneError>;

    async fn revoke_api_key(&self, consumer_id: &str, api_key: &str)
    -> Result<(), DataplaneError>;

    /// All consumers currently known to the data plane. Used by the drift
    /// reconciler.
    async fn list_consumers(&self) -> Result<Vec<Consumer>, DataplaneError>;

    /// Liveness of the data-plane admin surface.
    async fn health(&self) -> Result<bool, DataplaneError>;
}
