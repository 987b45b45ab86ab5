use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, mpsc};

use portcullis_core::ControlError;
use portcullis_store::keyspace::NOTIFIER_SEQ;
use portcullis_store::{ConfigStore, StoreError};

use crate::metrics::ControlMetrics;

/// How many sequence numbers are reserved in the store per persistence
/// round-trip. Larger blocks mean fewer writes and larger (harmless) gaps
/// after a restart.
const SEQ_BLOCK: u64 = 64;

/// How many recent events are retained for subscriber replay.
const RETAIN_EVENTS: usize = 1024;

/// What happened to a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Create,
    Update,
    Delete,
}

/// A sequenced configuration change, as delivered to data-plane
/// subscribers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// Process-wide monotonic sequence number, durable across restarts.
    pub seq: u64,
    pub kind: ChangeKind,
    /// Store key, e.g. `routes/<id>`.
    pub key: String,
    /// The value after the change; `None` for deletes.
    pub new_value: Option<serde_json::Value>,
    /// The value before the change; `None` for creates.
    pub old_value: Option<serde_json::Value>,
    /// What produced the change: `admin`, `portal`, `version`, `sync`,
    /// `reconcile`, or `recovery`.
    pub source: String,
    pub timestamp: DateTime<Utc>,
}

/// A change before it has been assigned a sequence number.
#[derive(Debug, Clone)]
pub struct PendingChange {
    pub kind: ChangeKind,
    pub key: String,
    pub new_value: Option<serde_json::Value>,
    pub old_value: Option<serde_json::Value>,
}

/// What a subscriber receives.
#[derive(Debug, Clone)]
pub enum Notification {
    /// A single change.
    Event(ChangeEvent),
    /// An atomic batch covering one contiguous seq range (version
    /// activation, import, recovery). Must be applied as a unit.
    Batch(Vec<ChangeEvent>),
    /// Requested replay point is no longer retained: perform a full `list`
    /// reconciliation, then resume from the live stream.
    Reset,
}

/// A live subscription to the change stream.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<Notification>,
}

impl Subscription {
    /// Receive the next notification; `None` once the notifier shuts down.
    pub async fn recv(&mut self) -> Option<Notification> {
        self.rx.recv().await
    }
}

struct NotifierState {
    /// Next sequence number to hand out.
    next_seq: u64,
    /// Exclusive upper bound of the persisted reservation; issuing past it
    /// requires another store write first.
    reserved_until: u64,
    ring: VecDeque<ChangeEvent>,
    subscribers: Vec<mpsc::UnboundedSender<Notification>>,
    shut_down: bool,
}

impl NotifierState {
    fn retain_push(&mut self, event: ChangeEvent) {
        if self.ring.len() == RETAIN_EVENTS {
            self.ring.pop_front();
        }
        self.ring.push_back(event);
    }

    fn fan_out(&mut self, notification: &Notification) {
        self.subscribers
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }
}

/// Broadcasts sequenced configuration changes to data-plane subscribers.
///
/// Sequence durability works by block reservation: a high-water mark is
/// persisted at `notifier/seq` before any seq up to it is issued, so a
/// restart resumes strictly above everything ever handed out. Gaps in the
/// issued stream are possible after a crash; regressions are not.
pub struct Notifier {
    store: Arc<dyn ConfigStore>,
    state: Mutex<NotifierState>,
    metrics: Arc<ControlMetrics>,
}

impl Notifier {
    /// Recover the persisted sequence mark and reserve the first block.
    pub async fn new(
        store: Arc<dyn ConfigStore>,
        metrics: Arc<ControlMetrics>,
    ) -> Result<Self, ControlError> {
        let persisted = match store.get(NOTIFIER_SEQ).await {
            Ok(bytes) => String::from_utf8_lossy(&bytes)
                .trim()
                .parse::<u64>()
                .map_err(|e| ControlError::Internal(format!("corrupt notifier/seq: {e}")))?,
            Err(StoreError::NotFound(_)) => 0,
            Err(e) => return Err(ControlError::Store(e.to_string())),
        };

        let next_seq = persisted + 1;
        let reserved_until = next_seq + SEQ_BLOCK;
        Self::persist_mark(store.as_ref(), reserved_until).await?;

        Ok(Self {
            store,
            state: Mutex::new(NotifierState {
                next_seq,
                reserved_until,
                ring: VecDeque::new(),
                subscribers: Vec::new(),
                shut_down: false,
            }),
            metrics,
        })
    }

    async fn persist_mark(store: &dyn ConfigStore, mark: u64) -> Result<(), ControlError> {
        store
            .put(NOTIFIER_SEQ, mark.to_string().into_bytes())
            .await
            .map_err(|e| ControlError::Store(format!("failed to persist notifier seq: {e}")))
    }

    /// Assign `count` contiguous sequence numbers, extending the persisted
    /// reservation when needed. Returns the first assigned seq.
    async fn reserve(&self, state: &mut NotifierState, count: u64) -> Result<u64, ControlError> {
        let first = state.next_seq;
        let last = first + count - 1;
        if last >= state.reserved_until {
            let mark = last + SEQ_BLOCK;
            Self::persist_mark(self.store.as_ref(), mark).await?;
            state.reserved_until = mark;
        }
        state.next_seq = last + 1;
        Ok(first)
    }

    /// Publish a single change. Called after the store accepted the write
    /// and before the API acknowledges it; the caller logs (but does not
    /// propagate) failures.
    pub async fn publish(
        &self,
        change: PendingChange,
        source: &str,
    ) -> Result<u64, ControlError> {
        let mut state = self.state.lock().await;
        if state.shut_down {
            return Err(ControlError::Internal("notifier is shut down".into()));
        }
        let seq = self.reserve(&mut state, 1).await?;

        let event = ChangeEvent {
            seq,
            kind: change.kind,
            key: change.key,
            new_value: change.new_value,
            old_value: change.old_value,
            source: source.to_owned(),
            timestamp: Utc::now(),
        };

        state.retain_push(event.clone());
        state.fan_out(&Notification::Event(event));
        ControlMetrics::incr(&self.metrics.published);
        Ok(seq)
    }

    /// Publish a set of changes as one atomic batch spanning a contiguous
    /// seq range. Subscribers must apply the whole batch or none of it.
    pub async fn publish_batch(
        &self,
        changes: Vec<PendingChange>,
        source: &str,
    ) -> Result<(), ControlError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut state = self.state.lock().await;
        if state.shut_down {
            return Err(ControlError::Internal("notifier is shut down".into()));
        }
        let first = self.reserve(&mut state, changes.len() as u64).await?;

        let now = Utc::now();
        let events: Vec<ChangeEvent> = changes
            .into_iter()
            .enumerate()
            .map(|(i, change)| ChangeEvent {
                seq: first + i as u64,
                kind: change.kind,
                key: change.key,
                new_value: change.new_value,
                old_value: change.old_value,
                source: source.to_owned(),
                timestamp: now,
            })
            .collect();

        for event in &events {
            state.retain_push(event.clone());
        }
        ControlMetrics::add(&self.metrics.published, events.len() as u64);
        ControlMetrics::incr(&self.metrics.batches);
        state.fan_out(&Notification::Batch(events));
        Ok(())
    }

    /// Subscribe to the change stream.
    ///
    /// With `from_seq`, retained events strictly after it are replayed
    /// first; if that point is no longer retained, a single
    /// [`Notification::Reset`] is delivered instead and the subscriber must
    /// re-`list` before consuming live events.
    pub async fn subscribe(&self, from_seq: Option<u64>) -> Subscription {
        let mut state = self.state.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(seq) = from_seq {
            let oldest = state.ring.front().map(|e| e.seq);
            let lost = match oldest {
                Some(oldest) => seq + 1 < oldest,
                // Nothing retained: anything before the next seq is gone.
                None => seq + 1 < state.next_seq,
            };
            if lost {
                let _ = tx.send(Notification::Reset);
            } else {
                for event in state.ring.iter().filter(|e| e.seq > seq) {
                    let _ = tx.send(Notification::Event(event.clone()));
                }
            }
        }

        state.subscribers.push(tx);
        Subscription { rx }
    }

    /// The next sequence number that will be issued.
    pub async fn next_seq(&self) -> u64 {
        self.state.lock().await.next_seq
    }

    /// Number of live subscribers.
    pub async fn subscriber_count(&self) -> usize {
        self.state.lock().await.subscribers.len()
    }

    /// Stop accepting publishes and terminate all subscriptions.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.shut_down = true;
        state.subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use portcullis_store_memory::MemoryConfigStore;

    use super::*;

    async fn notifier_over(store: Arc<dyn ConfigStore>) -> Notifier {
        Notifier::new(store, Arc::new(ControlMetrics::default()))
            .await
            .expect("notifier should initialize")
    }

    fn change(key: &str, kind: ChangeKind) -> PendingChange {
        PendingChange {
            kind,
            key: key.to_owned(),
            new_value: Some(serde_json::json!({"k": key})),
            old_value: None,
        }
    }

    #[tokio::test]
    async fn seq_is_strictly_increasing() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let notifier = notifier_over(store).await;

        let mut sub = notifier.subscribe(None).await;
        let a = notifier
            .publish(change("routes/r1", ChangeKind::Create), "admin")
            .await
            .unwrap();
        let b = notifier
            .publish(change("routes/r1", ChangeKind::Update), "admin")
            .await
            .unwrap();
        let c = notifier
            .publish(change("routes/r1", ChangeKind::Delete), "admin")
            .await
            .unwrap();
        assert!(a < b && b < c);

        for expected in [ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete] {
            match sub.recv().await.unwrap() {
                Notification::Event(event) => assert_eq!(event.kind, expected),
                other => panic!("expected event, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn restart_resumes_strictly_above_persisted_mark() {
        let store = Arc::new(MemoryConfigStore::new());

        let first = notifier_over(Arc::clone(&store) as Arc<dyn ConfigStore>).await;
        let seq = first
            .publish(change("routes/r1", ChangeKind::Create), "admin")
            .await
            .unwrap();

        // Simulated restart over the same store.
        let second = notifier_over(store as Arc<dyn ConfigStore>).await;
        let resumed = second
            .publish(change("routes/r2", ChangeKind::Create), "admin")
            .await
            .unwrap();
        assert!(
            resumed > seq,
            "restarted notifier must never reuse or regress seq"
        );
    }

    #[tokio::test]
    async fn replay_and_reset() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let notifier = notifier_over(store).await;

        let first = notifier
            .publish(change("routes/r1", ChangeKind::Create), "admin")
            .await
            .unwrap();
        notifier
            .publish(change("routes/r2", ChangeKind::Create), "admin")
            .await
            .unwrap();

        // Replay everything after the first event.
        let mut sub = notifier.subscribe(Some(first)).await;
        match sub.recv().await.unwrap() {
            Notification::Event(event) => assert_eq!(event.key, "routes/r2"),
            other => panic!("expected replayed event, got {other:?}"),
        }

        // A hopeless replay point gets a reset sentinel.
        for i in 0..(RETAIN_EVENTS + 8) {
            notifier
                .publish(change(&format!("routes/x{i}"), ChangeKind::Create), "admin")
                .await
                .unwrap();
        }
        let mut stale = notifier.subscribe(Some(first)).await;
        assert!(matches!(stale.recv().await.unwrap(), Notification::Reset));
    }

    #[tokio::test]
    async fn batch_is_contiguous_and_atomic() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let notifier = notifier_over(store).await;

        let mut sub = notifier.subscribe(None).await;
        notifier
            .publish_batch(
                vec![
                    change("routes/r1", ChangeKind::Create),
                    change("upstreams/u1", ChangeKind::Create),
                    change("plugins/p1", ChangeKind::Delete),
                ],
                "version",
            )
            .await
            .unwrap();

        match sub.recv().await.unwrap() {
            Notification::Batch(events) => {
                assert_eq!(events.len(), 3);
                assert_eq!(events[1].seq, events[0].seq + 1);
                assert_eq!(events[2].seq, events[1].seq + 1);
                assert!(events.iter().all(|e| e.source == "version"));
            }
            other => panic!("expected batch, got {other:?}"),
        }
    }
}
