use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use portcullis_core::ControlError;
use portcullis_store::keyspace;

use crate::metrics::ControlMetrics;
use crate::notifier::{ChangeKind, PendingChange};
use crate::service::ConfigService;

/// Background worker that heals dropped change notifications.
///
/// Publish failures never fail the write path, so a subscriber can fall
/// behind the store. This worker diffs the store listing against what it
/// saw on the previous pass and republishes the difference; anything a
/// lost notification skipped reaches subscribers within one interval.
pub struct ReconcileWorker {
    service: Arc<ConfigService>,
    metrics: Arc<ControlMetrics>,
    interval: Duration,
    last_seen: HashMap<String, Vec<u8>>,
    seeded: bool,
}

impl ReconcileWorker {
    pub fn new(
        service: Arc<ConfigService>,
        metrics: Arc<ControlMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            metrics,
            interval,
            last_seen: HashMap::new(),
            seeded: false,
        }
    }

    /// Spawn the worker loop. Dropping the returned sender (or sending on
    /// it) stops the worker.
    pub fn spawn(mut self) -> (tokio::task::JoinHandle<()>, mpsc::Sender<()>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            // The immediate first tick seeds the baseline.
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "config reconciliation pass failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("reconcile worker stopped");
        });
        (handle, shutdown_tx)
    }

    /// One reconciliation pass. The first pass only records the baseline.
    pub async fn run_once(&mut self) -> Result<(), ControlError> {
        let mut current: HashMap<String, Vec<u8>> = HashMap::new();
        for prefix in [keyspace::ROUTES, keyspace::UPSTREAMS, keyspace::PLUGINS] {
            let entries = self
                .service
                .store()
                .list(prefix)
                .await
                .map_err(|e| ControlError::Store(e.to_string()))?;
            current.extend(entries);
        }

        if !self.seeded {
            self.last_seen = current;
            self.seeded = true;
            return Ok(());
        }

        let mut diffs: Vec<PendingChange> = Vec::new();

        for (key, value) in &current {
            match self.last_seen.get(key) {
                None => diffs.push(PendingChange {
                    kind: ChangeKind::Create,
                    key: key.clone(),
                    new_value: serde_json::from_slice(value).ok(),
                    old_value: None,
                }),
                Some(old) if old != value => diffs.push(PendingChange {
                    kind: ChangeKind::Update,
                    key: key.clone(),
                    new_value: serde_json::from_slice(value).ok(),
                    old_value: serde_json::from_slice(old).ok(),
                }),
                Some(_) => {}
            }
        }
        for (key, old) in &self.last_seen {
            if !current.contains_key(key) {
                diffs.push(PendingChange {
                    kind: ChangeKind::Delete,
                    key: key.clone(),
                    new_value: None,
                    old_value: serde_json::from_slice(old).ok(),
                });
            }
        }

        ControlMetrics::incr(&self.metrics.reconcile_runs);
        if !diffs.is_empty() {
            debug!(count = diffs.len(), "republishing reconciliation diffs");
            ControlMetrics::add(&self.metrics.reconcile_diffs, diffs.len() as u64);
            self.service
                .notifier()
                .publish_batch(diffs, "reconcile")
                .await?;
        }

        self.last_seen = current;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use portcullis_store::ConfigStore;
    use portcullis_store_memory::MemoryConfigStore;

    use crate::notifier::{Notification, Notifier};

    use super::*;

    #[tokio::test]
    async fn republishes_out_of_band_store_changes() {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let metrics = Arc::new(ControlMetrics::default());
        let notifier = Arc::new(
            Notifier::new(Arc::clone(&store), Arc::clone(&metrics))
                .await
                .unwrap(),
        );
        let service = Arc::new(ConfigService::new(
            Arc::clone(&store),
            notifier,
            Arc::clone(&metrics),
        ));

        let mut worker = ReconcileWorker::new(
            Arc::clone(&service),
            metrics,
            Duration::from_secs(60),
        );

        // Seed the baseline.
        worker.run_once().await.unwrap();

        // A write that never got announced (simulates a dropped publish).
        store
            .put("routes/lost", br#"{"id":"lost"}"#.to_vec())
            .await
            .unwrap();

        let mut sub = service.notifier().subscribe(None).await;
        worker.run_once().await.unwrap();

        match sub.recv().await.unwrap() {
            Notification::Batch(events) => {
                assert_eq!(events.len(), 1);
                assert_eq!(events[0].key, "routes/lost");
                assert_eq!(events[0].kind, ChangeKind::Create);
                assert_eq!(events[0].source, "reconcile");
            }
            other => panic!("expected diff batch, got {other:?}"),
        }

        // A converged store produces no further diffs.
        let mut quiet = service.notifier().subscribe(None).await;
        worker.run_once().await.unwrap();
        let nothing =
            tokio::time::timeout(Duration::from_millis(100), quiet.recv()).await;
        assert!(nothing.is_err());
    }
}
