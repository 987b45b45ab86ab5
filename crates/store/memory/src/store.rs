use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use portcullis_store::error::StoreError;
use portcullis_store::store::{ConfigStore, EventKind, WatchEvent, WatchStream};

/// How many past events are retained for watch restarts.
const REPLAY_LOG_CAPACITY: usize = 1024;

struct Watcher {
    prefix: String,
    tx: mpsc::UnboundedSender<Result<WatchEvent, StoreError>>,
}

struct State {
    data: BTreeMap<String, Vec<u8>>,
    /// Monotonic revision, bumped once per accepted mutation.
    revision: u64,
    /// Recent events for replay; contiguous revisions, oldest first.
    log: VecDeque<WatchEvent>,
    watchers: Vec<Watcher>,
    closed: bool,
}

/// In-memory [`ConfigStore`].
///
/// A single mutex covers data, revision assignment, the replay log, and
/// watcher fan-out, so the order events reach a subscriber is exactly the
/// order the writes committed. Not intended for production; the etcd
/// backend is the primary store.
pub struct MemoryConfigStore {
    state: Mutex<State>,
}

impl Default for MemoryConfigStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(State {
                data: BTreeMap::new(),
                revision: 0,
                log: VecDeque::new(),
                watchers: Vec::new(),
                closed: false,
            }),
        }
    }
}

impl MemoryConfigStore {
    /// Create a new, empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // Mutex poisoning only happens if a writer panicked; the data is a
        // plain map, so continuing with it is safe.
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl State {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    /// Record an event and fan it out to matching watchers. Must run under
    /// the same lock as the mutation it describes.
    fn emit(&mut self, kind: EventKind, key: String, value: Option<Vec<u8>>) {
        self.revision += 1;
        let event = WatchEvent {
            kind,
            key,
            value,
            revision: self.revision,
        };

        if self.log.len() == REPLAY_LOG_CAPACITY {
            self.log.pop_front();
        }
        self.log.push_back(event.clone());

        self.watchers.retain(|w| {
            if event.key.starts_with(&w.prefix) {
                w.tx.send(Ok(event.clone())).is_ok()
            } else {
                // Keep watchers whose channel is still open.
                !w.tx.is_closed()
            }
        });
    }

    /// Revision of the oldest retained event, given contiguous revisions.
    fn oldest_retained(&self) -> u64 {
        self.log.front().map_or(self.revision + 1, |e| e.revision)
    }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let state = self.lock();
        state.ensure_open()?;
        state
            .data
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.ensure_open()?;
        state.data.insert(key.to_owned(), value.clone());
        state.emit(EventKind::Put, key.to_owned(), Some(value));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.ensure_open()?;
        if state.data.remove(key).is_none() {
            return Err(StoreError::NotFound(key.to_owned()));
        }
        state.emit(EventKind::Delete, key.to_owned(), None);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>, StoreError> {
        let state = self.lock();
        state.ensure_open()?;
        Ok(state
            .data
            .range(prefix.to_owned()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn watch(
        &self,
        prefix: &str,
        from_revision: Option<u64>,
    ) -> Result<WatchStream, StoreError> {
        let mut state = self.lock();
        state.ensure_open()?;

        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(rev) = from_revision {
            if rev < state.revision && rev + 1 < state.oldest_retained() {
                return Err(StoreError::Compacted(rev));
            }
            for event in &state.log {
                if event.revision > rev && event.key.starts_with(prefix) {
                    // Receiver is still in scope; send cannot fail.
                    let _ = tx.send(Ok(event.clone()));
                }
            }
        }

        state.watchers.push(Watcher {
            prefix: prefix.to_owned(),
            tx,
        });

        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }

    async fn close(&self) -> Result<(), StoreError> {
        let mut state = self.lock();
        state.closed = true;
        // Dropping the senders terminates every live stream.
        state.watchers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use portcullis_store::testing::{run_close_conformance_tests, run_store_conformance_tests};

    use super::*;

    #[tokio::test]
    async fn conformance() {
        let store = MemoryConfigStore::new();
        run_store_conformance_tests(&store)
            .await
            .expect("conformance tests should pass");
    }

    #[tokio::test]
    async fn close_conformance() {
        let store = MemoryConfigStore::new();
        run_close_conformance_tests(&store)
            .await
            .expect("close conformance tests should pass");
    }

    #[tokio::test]
    async fn watch_filters_by_prefix() {
        let store = MemoryConfigStore::new();
        let mut watch = store.watch("routes/", None).await.unwrap();

        store.put("upstreams/u1", b"u".to_vec()).await.unwrap();
        store.put("routes/r1", b"r".to_vec()).await.unwrap();

        let event = watch.next().await.unwrap().unwrap();
        assert_eq!(event.key, "routes/r1");
    }

    #[tokio::test]
    async fn replay_from_compacted_revision_fails() {
        let store = MemoryConfigStore::new();
        for i in 0..(REPLAY_LOG_CAPACITY + 10) {
            store
                .put(&format!("k/{i}"), b"v".to_vec())
                .await
                .unwrap();
        }

        let err = store.watch("k/", Some(1)).await.err().unwrap();
        assert!(matches!(err, StoreError::Compacted(1)));
    }

    #[tokio::test]
    async fn replay_skips_already_seen_revisions() {
        let store = MemoryConfigStore::new();
        store.put("k/a", b"1".to_vec()).await.unwrap();
        store.put("k/b", b"2".to_vec()).await.unwrap();
        store.put("k/c", b"3".to_vec()).await.unwrap();

        let mut watch = store.watch("k/", Some(2)).await.unwrap();
        let event = watch.next().await.unwrap().unwrap();
        assert_eq!(event.key, "k/c");
        assert_eq!(event.revision, 3);
    }

    #[tokio::test]
    async fn dropped_watcher_is_pruned() {
        let store = MemoryConfigStore::new();
        let watch = store.watch("k/", None).await.unwrap();
        drop(watch);

        // The next mutation notices the closed channel and prunes it.
        store.put("k/a", b"1".to_vec()).await.unwrap();
        store.put("other/b", b"2".to_vec()).await.unwrap();
        assert_eq!(store.lock().watchers.len(), 0);
    }
}
