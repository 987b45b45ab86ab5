use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::DataplaneError;
use crate::{Consumer, DataplaneClient};

#[derive(Debug, Clone)]
struct MockEntry {
    consumer: Consumer,
    keys: Vec<String>,
}

/// Deterministic in-process [`DataplaneClient`] used by tests and selected
/// by the `mock://` configuration sentinel.
///
/// Individual operations can be scripted to fail once, which is how the
/// compensation paths are exercised.
#[derive(Debug, Default)]
pub struct MockDataplaneClient {
    consumers: DashMap<String, MockEntry>,
    fail_create: AtomicBool,
    fail_delete: AtomicBool,
    fail_generate: AtomicBool,
    fail_revoke: AtomicBool,
}

impl MockDataplaneClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_consumer` call fail with a gateway error.
    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    /// Make the next `delete_consumer` call fail with a gateway error.
    pub fn fail_next_delete(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    /// Make the next `generate_api_key` call fail with a gateway error.
    pub fn fail_next_generate(&self) {
        self.fail_generate.store(true, Ordering::SeqCst);
    }

    /// Make the next `revoke_api_key` call fail with a gateway error.
    pub fn fail_next_revoke(&self) {
        self.fail_revoke.store(true, Ordering::SeqCst);
    }

    /// Number of consumers currently registered.
    #[must_use]
    pub fn consumer_count(&self) -> usize {
        self.consumers.len()
    }

    /// Look up a consumer by id.
    #[must_use]
    pub fn consumer(&self, id: &str) -> Option<Consumer> {
        self.consumers.get(id).map(|e| e.consumer.clone())
    }

    /// API keys registered for a consumer.
    #[must_use]
    pub fn keys(&self, id: &str) -> Vec<String> {
        self.consumers
            .get(id)
            .map(|e| e.keys.clone())
            .unwrap_or_default()
    }

    fn take_failure(&self, flag: &AtomicBool, op: &str) -> Result<(), DataplaneError> {
        if flag.swap(false, Ordering::SeqCst) {
            Err(DataplaneError::Api {
                status: 503,
                message: format!("scripted {op} failure"),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DataplaneClient for MockDataplaneClient {
    async fn create_consumer(&self, consumer: &Consumer) -> Result<(), DataplaneError> {
        self.take_failure(&self.fail_create, "create_consumer")?;
        if self.consumers.contains_key(&consumer.id) {
            return Err(DataplaneError::Api {
                status: 409,
                message: format!("consumer {} already exists", consumer.id),
            });
        }
        self.consumers.insert(
            consumer.id.clone(),
            MockEntry {
                consumer: consumer.clone(),
                keys: Vec::new(),
            },
        );
        Ok(())
    }

    async fn delete_consumer(&self, id: &str) -> Result<(), DataplaneError> {
        self.take_failure(&self.fail_delete, "delete_consumer")?;
        self.consumers.remove(id);
        Ok(())
    }

    async fn generate_api_key(
        &self,
        consumer_id: &str,
        api_key: &str,
    ) -> Result<(), DataplaneError> {
        self.take_failure(&self.fail_generate, "generate_api_key")?;
        let Some(mut entry) = self.consumers.get_mut(consumer_id) else {
            return Err(DataplaneError::Api {
                status: 404,
                message: format!("consumer {consumer_id} not found"),
            });
        };
        if !entry.keys.iter().any(|k| k == api_key) {
            entry.keys.push(api_key.to_owned());
        }
        Ok(())
    }

    async fn revoke_api_key(&self, consumer_id: &str, api_key: &str) -> Result<(), DataplaneError> {
        self.take_failure(&self.fail_revoke, "revoke_api_key")?;
        if let Some(mut entry) = self.consumers.get_mut(consumer_id) {
            entry.keys.retain(|k| k != api_key);
        }
        Ok(())
    }

    async fn list_consumers(&self) -> Result<Vec<Consumer>, DataplaneError> {
        let mut consumers: Vec<Consumer> = self
            .consumers
            .iter()
            .map(|e| e.consumer.clone())
            .collect();
        consumers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(consumers)
    }

    async fn health(&self) -> Result<bool, DataplaneError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn consumer(id: &str) -> Consumer {
        Consumer {
            id: id.into(),
            username: format!("app-{id}"),
        }
    }

    #[tokio::test]
    async fn consumer_and_key_lifecycle() {
        let mock = MockDataplaneClient::new();
        mock.create_consumer(&consumer("c1")).await.unwrap();
        mock.generate_api_key("c1", "key-1").await.unwrap();

        assert_eq!(mock.consumer_count(), 1);
        assert_eq!(mock.keys("c1"), vec!["key-1".to_owned()]);

        mock.revoke_api_key("c1", "key-1").await.unwrap();
        assert!(mock.keys("c1").is_empty());

        mock.delete_consumer("c1").await.unwrap();
        assert_eq!(mock.consumer_count(), 0);
    }

    #[tokio::test]
    async fn duplicate_consumer_conflicts() {
        let mock = MockDataplaneClient::new();
        mock.create_consumer(&consumer("c1")).await.unwrap();
        let err = mock.create_consumer(&consumer("c1")).await.unwrap_err();
        assert!(matches!(err, DataplaneError::Api { status: 409, .. }));
    }

    #[tokio::test]
    async fn scripted_failure_fires_once() {
        let mock = MockDataplaneClient::new();
        mock.fail_next_create();

        let err = mock.create_consumer(&consumer("c1")).await.unwrap_err();
        assert!(err.is_retryable());

        // Second attempt succeeds.
        mock.create_consumer(&consumer("c1")).await.unwrap();
    }
}
