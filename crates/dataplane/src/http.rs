use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;

use crate::error::DataplaneError;
use crate::{Consumer, DataplaneClient};

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Attempts per logical operation (first try plus two retries).
const MAX_ATTEMPTS: u32 = 3;

/// Initial retry backoff; doubles per attempt, keeping the whole retry
/// budget under roughly one second.
const INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// HTTP client for the data-plane admin surface.
///
/// 5xx responses and transport failures are retried with bounded
/// exponential backoff before surfacing a gateway error.
#[derive(Debug, Clone)]
pub struct HttpDataplaneClient {
    client: Client,
    base_url: String,
    admin_key: Option<String>,
}

/// Builder for configuring an [`HttpDataplaneClient`].
#[derive(Debug)]
pub struct HttpDataplaneClientBuilder {
    base_url: String,
    timeout: Duration,
    admin_key: Option<String>,
}

impl HttpDataplaneClientBuilder {
    /// Create a new builder with the given base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: DEFAULT_TIMEOUT,
            admin_key: None,
        }
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the admin key sent as a bearer token.
    #[must_use]
    pub fn admin_key(mut self, key: impl Into<String>) -> Self {
        self.admin_key = Some(key.into());
        self
    }

    /// Build the client.
    pub fn build(self) -> Result<HttpDataplaneClient, DataplaneError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| DataplaneError::Configuration(e.to_string()))?;

        Ok(HttpDataplaneClient {
            client,
            base_url: self.base_url,
            admin_key: self.admin_key,
        })
    }
}

#[derive(Debug, Deserialize)]
struct WireError {
    #[serde(default)]
    message: String,
}

impl HttpDataplaneClient {
    /// Create a client with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self, DataplaneError> {
        HttpDataplaneClientBuilder::new(base_url).build()
    }

    /// The configured base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one request, translating transport and status failures.
    async fn request_once(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<reqwest::Response, DataplaneError> {
        let url = format!("{}{path}", self.base_url);
        let mut req = self.client.request(method, &url);
        if let Some(key) = &self.admin_key {
            req = req.bearer_auth(key);
        }
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| DataplaneError::Connection(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let message = resp
            .json::<WireError>()
            .await
            .map(|e| e.message)
            .unwrap_or_else(|_| status.to_string());
        Err(DataplaneError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Issue a request with bounded exponential backoff on retryable
    /// failures.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<reqwest::Response, DataplaneError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self.request_once(method.clone(), path, body.as_ref()).await {
                Ok(resp) => return Ok(resp),
                Err(e) if e.is_retryable() && attempt < MAX_ATTEMPTS => {
                    tracing::debug!(
                        attempt,
                        path,
                        error = %e,
                        "data-plane call failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_err.unwrap_or_else(|| DataplaneError::Connection("retries exhausted".into())))
    }
}

#[async_trait]
impl DataplaneClient for HttpDataplaneClient {
    async fn create_consumer(&self, consumer: &Consumer) -> Result<(), DataplaneError> {
        let body = serde_json::json!({ "id": consumer.id, "username": consumer.username });
        self.request(Method::POST, "/admin/consumers", Some(body))
            .await?;
        Ok(())
    }

    async fn delete_consumer(&self, id: &str) -> Result<(), DataplaneError> {
        match self
            .request(Method::DELETE, &format!("/admin/consumers/{id}"), None)
            .await
        {
            Ok(_) => Ok(()),
            // Already gone remotely counts as deleted.
            Err(DataplaneError::Api { status, .. }) if status == 404 => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn generate_api_key(
        &self,
        consumer_id: &str,
        api_key: &str,
    ) -> Result<(), DataplaneError> {
        let body = serde_json::json!({ "key": api_key });
        self.request(
            Method::POST,
            &format!("/admin/consumers/{consumer_id}/keys"),
            Some(body),
        )
        .await?;
        Ok(())
    }

    async fn revoke_api_key(&self, consumer_id: &str, api_key: &str) -> Result<(), DataplaneError> {
        match self
            .request(
                Method::DELETE,
                &format!("/admin/consumers/{consumer_id}/keys/{api_key}"),
                None,
            )
            .await
        {
            Ok(_) => Ok(()),
            Err(DataplaneError::Api { status, .. }) if status == 404 => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_consumers(&self) -> Result<Vec<Consumer>, DataplaneError> {
        let resp = self.request(Method::GET, "/admin/consumers", None).await?;
        resp.json::<Vec<Consumer>>()
            .await
            .map_err(|e| DataplaneError::Deserialization(e.to_string()))
    }

    async fn health(&self) -> Result<bool, DataplaneError> {
        match self.request_once(Method::GET, "/health", None).await {
            Ok(_) => Ok(true),
            Err(DataplaneError::Api { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_trims_trailing_slash() {
        let client = HttpDataplaneClient::new("http://localhost:8001/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:8001");
    }

    #[test]
    fn retry_classification() {
        assert!(DataplaneError::Connection("refused".into()).is_retryable());
        assert!(
            DataplaneError::Api {
                status: 503,
                message: String::new()
            }
            .is_retryable()
        );
        assert!(
            !DataplaneError::Api {
                status: 404,
                message: String::new()
            }
            .is_retryable()
        );
    }
}
