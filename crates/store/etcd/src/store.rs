use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use etcd_client::{Client, DeleteOptions, EventType, GetOptions, WatchOptions};
use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_stream::wrappers::ReceiverStream;

use portcullis_store::error::StoreError;
use portcullis_store::store::{ConfigStore, EventKind, WatchEvent, WatchStream};

use crate::config::EtcdConfig;

/// etcd-backed implementation of [`ConfigStore`].
///
/// Values are stored raw; etcd's `mod_revision` is surfaced as the watch
/// revision, which makes watch restarts line up with etcd's own compaction
/// behavior. The client is shared behind a mutex exactly as the rest of the
/// backends do.
pub struct EtcdConfigStore {
    client: Arc<Mutex<Client>>,
    config: Arc<EtcdConfig>,
    closed: Arc<AtomicBool>,
    watch_tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl EtcdConfigStore {
    /// Create a new `EtcdConfigStore` by connecting to etcd.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Connection`] if the connection cannot be
    /// established.
    pub async fn new(config: EtcdConfig) -> Result<Self, StoreError> {
        let client = Client::connect(
            config.endpoints.clone(),
            Some(etcd_client::ConnectOptions::new().with_timeout(config.connect_timeout)),
        )
        .await
        .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(Mutex::new(client)),
            config: Arc::new(config),
            closed: Arc::new(AtomicBool::new(false)),
            watch_tasks: Mutex::new(Vec::new()),
        })
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    async fn with_timeout<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T, etcd_client::Error>>,
    ) -> Result<T, StoreError> {
        match tokio::time::timeout(self.config.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| StoreError::Backend(e.to_string())),
            Err(_) => Err(StoreError::Timeout(self.config.op_timeout)),
        }
    }
}

#[async_trait]
impl ConfigStore for EtcdConfigStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.ensure_open()?;
        let etcd_key = self.config.render_key(key);

        let mut client = self.client.lock().await;
        let resp = self.with_timeout(client.get(etcd_key, None)).await?;

        resp.kvs()
            .first()
            .map(|kv| kv.value().to_vec())
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.ensure_open()?;
        let etcd_key = self.config.render_key(key);

        let mut client = self.client.lock().await;
        self.with_timeout(client.put(etcd_key, value, None)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.ensure_open()?;
        let etcd_key = self.config.render_key(key);

        let mut client = self.client.lock().await;
        let resp = self
            .with_timeout(client.delete(etcd_key, Some(DeleteOptions::new())))
            .await?;

        if resp.deleted() == 0 {
            return Err(StoreError::NotFound(key.to_owned()));
        }
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        self.ensure_open()?;
        let etcd_prefix = self.config.render_key(prefix);

        let mut client = self.client.lock().await;
        let resp = self
            .with_timeout(client.get(etcd_prefix, Some(GetOptions::new().with_prefix())))
            .await?;

        let mut out = BTreeMap::new();
        for kv in resp.kvs() {
            let raw_key = kv
                .key_str()
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            out.insert(
                self.config.strip_key(raw_key).to_owned(),
                kv.value().to_vec(),
            );
        }
        Ok(out)
    }

    async fn watch(
        &self,
        prefix: &str,
        from_revision: Option<u64>,
    ) -> Result<WatchStream, StoreError> {
        self.ensure_open()?;
        let etcd_prefix = self.config.render_key(prefix);

        let mut options = WatchOptions::new().with_prefix();
        if let Some(rev) = from_revision {
            // etcd's start_revision is inclusive; we replay strictly after.
            options = options.with_start_revision(i64::try_from(rev + 1).unwrap_or(i64::MAX));
        }

        let mut client = self.client.lock().await;
        let (watcher, mut etcd_stream) = self
            .with_timeout(client.watch(etcd_prefix, Some(options)))
            .await?;
        drop(client);

        let (tx, rx) = mpsc::channel(64);
        let config = Arc::clone(&self.config);

        let handle = tokio::spawn(async move {
            // Keep the watcher alive for the lifetime of the stream; dropping
            // it cancels the server-side watch.
            let _watcher = watcher;

            while let Some(result) = etcd_stream.next().await {
                let resp = match result {
                    Ok(resp) => resp,
                    Err(e) => {
                        let _ = tx.send(Err(StoreError::Backend(e.to_string()))).await;
                        return;
                    }
                };

                if resp.canceled() {
                    let compact = resp.compact_revision();
                    if compact > 0 {
                        let _ = tx
                            .send(Err(StoreError::Compacted(
                                u64::try_from(compact).unwrap_or(0),
                            )))
                            .await;
                    }
                    return;
                }

                for event in resp.events() {
                    let Some(kv) = event.kv() else { continue };
                    let Ok(raw_key) = kv.key_str() else { continue };

                    let translated = WatchEvent {
                        kind: match event.event_type() {
                            EventType::Put => EventKind::Put,
                            EventType::Delete => EventKind::Delete,
                        },
                        key: config.strip_key(raw_key).to_owned(),
                        value: match event.event_type() {
                            EventType::Put => Some(kv.value().to_vec()),
                            EventType::Delete => None,
                        },
                        revision: u64::try_from(kv.mod_revision()).unwrap_or(0),
                    };

                    if tx.send(Ok(translated)).await.is_err() {
                        // Receiver dropped: cancel the watch.
                        return;
                    }
                }
            }
        });

        self.watch_tasks.lock().await.push(handle);

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn close(&self) -> Result<(), StoreError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Aborting the forwarding tasks drops their senders, terminating
        // every live watch stream.
        let mut tasks = self.watch_tasks.lock().await;
        for task in tasks.drain(..) {
            task.abort();
        }

        tracing::debug!("etcd store closed");
        Ok(())
    }
}
