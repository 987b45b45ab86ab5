//! Reusable conformance suite for [`ConfigStore`] backends.
//!
//! Call [`run_store_conformance_tests`] from a backend's test module with a
//! fresh store instance. Close semantics are destructive, so they live in
//! [`run_close_conformance_tests`] and expect their own instance.

use std::time::Duration;

use futures::StreamExt;

use crate::error::StoreError;
use crate::store::{ConfigStore, EventKind, WatchEvent};

/// How long to wait for a watch event before declaring it missing.
const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

async fn next_event(stream: &mut crate::store::WatchStream) -> Result<WatchEvent, StoreError> {
    match tokio::time::timeout(EVENT_TIMEOUT, stream.next()).await {
        Ok(Some(event)) => event,
        Ok(None) => Err(StoreError::Backend("watch stream ended early".into())),
        Err(_) => Err(StoreError::Timeout(EVENT_TIMEOUT)),
    }
}

/// Run the full store conformance test suite.
///
/// # Errors
///
/// Returns an error if any conformance check fails.
pub async fn run_store_conformance_tests(store: &dyn ConfigStore) -> Result<(), StoreError> {
    test_get_missing(store).await?;
    test_put_and_get(store).await?;
    test_put_overwrites(store).await?;
    test_delete(store).await?;
    test_list_prefix(store).await?;
    test_watch_ordering(store).await?;
    test_watch_from_revision(store).await?;
    test_fresh_watcher_sees_no_history(store).await?;
    Ok(())
}

async fn test_get_missing(store: &dyn ConfigStore) -> Result<(), StoreError> {
    match store.get("conformance/missing").await {
        Err(StoreError::NotFound(_)) => Ok(()),
        Ok(_) => Err(StoreError::Backend(
            "get on missing key should be NotFound".into(),
        )),
        Err(e) => Err(e),
    }
}

async fn test_put_and_get(store: &dyn ConfigStore) -> Result<(), StoreError> {
    store.put("conformance/a", b"hello".to_vec()).await?;
    let val = store.get("conformance/a").await?;
    assert_eq!(val, b"hello".to_vec());
    Ok(())
}

async fn test_put_overwrites(store: &dyn ConfigStore) -> Result<(), StoreError> {
    store.put("conformance/b", b"v1".to_vec()).await?;
    store.put("conformance/b", b"v2".to_vec()).await?;
    let val = store.get("conformance/b").await?;
    assert_eq!(val, b"v2".to_vec(), "last writer should win");
    Ok(())
}

async fn test_delete(store: &dyn ConfigStore) -> Result<(), StoreError> {
    store.put("conformance/c", b"bye".to_vec()).await?;
    store.delete("conformance/c").await?;
    assert!(store.get("conformance/c").await.is_err_and(|e| e.is_not_found()));

    match store.delete("conformance/c").await {
        Err(StoreError::NotFound(_)) => Ok(()),
        Ok(()) => Err(StoreError::Backend(
            "delete on missing key should be NotFound".into(),
        )),
        Err(e) => Err(e),
    }
}

async fn test_list_prefix(store: &dyn ConfigStore) -> Result<(), StoreError> {
    store.put("conformance/list/x", b"1".to_vec()).await?;
    store.put("conformance/list/y", b"2".to_vec()).await?;
    store.put("conformance/other", b"3".to_vec()).await?;

    let listing = store.list("conformance/list/").await?;
    assert_eq!(listing.len(), 2, "list should only cover the prefix");
    assert_eq!(listing.get("conformance/list/x"), Some(&b"1".to_vec()));
    assert_eq!(listing.get("conformance/list/y"), Some(&b"2".to_vec()));
    Ok(())
}

async fn test_watch_ordering(store: &dyn ConfigStore) -> Result<(), StoreError> {
    let mut watch = store.watch("conformance/watch/", None).await?;

    store.put("conformance/watch/k", b"v1".to_vec()).await?;
    store.put("conformance/watch/k", b"v2".to_vec()).await?;
    store.delete("conformance/watch/k").await?;

    let first = next_event(&mut watch).await?;
    let second = next_event(&mut watch).await?;
    let third = next_event(&mut watch).await?;

    assert_eq!(first.kind, EventKind::Put);
    assert_eq!(first.value.as_deref(), Some(b"v1".as_slice()));
    assert_eq!(second.kind, EventKind::Put);
    assert_eq!(second.value.as_deref(), Some(b"v2".as_slice()));
    assert_eq!(third.kind, EventKind::Delete);
    assert!(
        first.revision < second.revision && second.revision < third.revision,
        "revisions must be strictly increasing"
    );
    Ok(())
}

async fn test_watch_from_revision(store: &dyn ConfigStore) -> Result<(), StoreError> {
    store.put("conformance/replay/k", b"v1".to_vec()).await?;

    // Observe the revision of a fresh write through a live watch.
    let mut live = store.watch("conformance/replay/", None).await?;
    store.put("conformance/replay/k", b"v2".to_vec()).await?;
    let marker = next_event(&mut live).await?;
    store.put("conformance/replay/k", b"v3".to_vec()).await?;

    // Restart from the marker: only the later write replays.
    let mut replay = store
        .watch("conformance/replay/", Some(marker.revision))
        .await?;
    let replayed = next_event(&mut replay).await?;
    assert_eq!(replayed.value.as_deref(), Some(b"v3".as_slice()));
    assert!(replayed.revision > marker.revision);
    Ok(())
}

async fn test_fresh_watcher_sees_no_history(store: &dyn ConfigStore) -> Result<(), StoreError> {
    store.put("conformance/quiet/k", b"old".to_vec()).await?;
    store.delete("conformance/quiet/k").await?;

    let mut watch = store.watch("conformance/quiet/", None).await?;
    match tokio::time::timeout(Duration::from_millis(200), watch.next()).await {
        Err(_) => Ok(()), // timed out: nothing delivered, as required
        Ok(Some(Ok(event))) => Err(StoreError::Backend(format!(
            "fresh watcher should not see prior history, got {event:?}"
        ))),
        Ok(Some(Err(e))) => Err(e),
        Ok(None) => Err(StoreError::Backend("watch stream ended early".into())),
    }
}

/// Run the close-semantics suite. Destroys the store.
///
/// # Errors
///
/// Returns an error if close semantics are violated.
pub async fn run_close_conformance_tests(store: &dyn ConfigStore) -> Result<(), StoreError> {
    store.put("conformance/close/k", b"v".to_vec()).await?;
    let mut watch = store.watch("conformance/close/", None).await?;

    store.close().await?;
    // Idempotent.
    store.close().await?;

    for result in [
        store.put("conformance/close/k", b"v2".to_vec()).await,
        store.get("conformance/close/k").await.map(|_| ()),
        store.delete("conformance/close/k").await,
        store.list("conformance/").await.map(|_| ()),
        store.watch("conformance/", None).await.map(|_| ()),
    ] {
        match result {
            Err(StoreError::Closed) => {}
            other => {
                return Err(StoreError::Backend(format!(
                    "operation after close should fail Closed, got {other:?}"
                )));
            }
        }
    }

    // Live streams terminate.
    match tokio::time::timeout(EVENT_TIMEOUT, watch.next()).await {
        Ok(None | Some(Err(StoreError::Closed))) => Ok(()),
        Ok(Some(other)) => Err(StoreError::Backend(format!(
            "watch after close should terminate, got {other:?}"
        ))),
        Err(_) => Err(StoreError::Backend(
            "watch stream did not terminate after close".into(),
        )),
    }
}
