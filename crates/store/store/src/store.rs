use std::collections::BTreeMap;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Whether a watch event reflects a write or a removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Put,
    Delete,
}

/// A single change observed on a watched prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: EventKind,
    pub key: String,
    /// The new value for `Put`; `None` for `Delete`.
    pub value: Option<Vec<u8>>,
    /// Backend revision at which the change committed. Strictly increasing
    /// within one watch stream.
    pub revision: u64,
}

/// A cancellable stream of watch events. Dropping the stream ends the watch.
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent, StoreError>> + Send>>;

/// Linearizable key-value store with prefix listing and prefix watch.
///
/// Implementations must be `Send + Sync` and safe for concurrent access.
/// Per-key ordering: events delivered to a watcher appear in the order the
/// writes committed. There is no cross-key ordering guarantee; callers that
/// need one sequence their own events on top (see the control-plane
/// notifier).
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Fetch the value stored at `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the key does not exist.
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Write `value` at `key`, overwriting any previous value
    /// (last-writer-wins).
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Remove `key`.
    ///
    /// # Errors
    ///
    /// [`StoreError::NotFound`] when the key does not exist.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Snapshot of all keys under `prefix` at call time.
    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, Vec<u8>>, StoreError>;

    /// Watch all keys under `prefix`.
    ///
    /// With `from_revision`, retained history strictly after that revision
    /// is replayed before live events; [`StoreError::Compacted`] signals the
    /// revision is no longer retained and the caller must re-`list`.
    /// Without it, the stream starts at the current head. Events MUST be
    /// delivered in strictly increasing revision order with no gap between
    /// an acknowledged `put`/`delete` and its event on live watchers.
    async fn watch(
        &self,
        prefix: &str,
        from_revision: Option<u64>,
    ) -> Result<WatchStream, StoreError>;

    /// Shut the store down. Idempotent; every operation (including `watch`)
    /// fails with [`StoreError::Closed`] afterwards, and live watch streams
    /// terminate.
    async fn close(&self) -> Result<(), StoreError>;
}
