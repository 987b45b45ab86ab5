use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use portcullis_core::ControlError;
use portcullis_dataplane::{Consumer, DataplaneClient};
use portcullis_portal::{ApplicationFilter, ApplicationRepository, PageRequest};

use crate::metrics::ControlMetrics;

/// Background worker that repairs portal ↔ data-plane drift.
///
/// Application writes and consumer provisioning span two systems with no
/// shared transaction; compensation covers the synchronous failure cases,
/// and this worker walks both sides periodically to catch everything else:
/// consumers missing for live applications, orphaned consumers whose
/// application is gone, and API keys that rotated locally but not remotely.
pub struct DriftWorker {
    applications: Arc<dyn ApplicationRepository>,
    client: Arc<dyn DataplaneClient>,
    metrics: Arc<ControlMetrics>,
    interval: Duration,
}

impl DriftWorker {
    pub fn new(
        applications: Arc<dyn ApplicationRepository>,
        client: Arc<dyn DataplaneClient>,
        metrics: Arc<ControlMetrics>,
        interval: Duration,
    ) -> Self {
        Self {
            applications,
            client,
            metrics,
            interval,
        }
    }

    /// Spawn the worker loop. Dropping the returned sender (or sending on
    /// it) stops the worker.
    pub fn spawn(self) -> (tokio::task::JoinHandle<()>, mpsc::Sender<()>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            // Skip the immediate tick so a fresh boot settles first.
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "drift reconciliation pass failed");
                        }
                    }
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("drift worker stopped");
        });
        (handle, shutdown_tx)
    }

    /// One reconciliation pass over all applications and consumers.
    pub async fn run_once(&self) -> Result<(), ControlError> {
        let consumers: HashMap<String, Consumer> = self
            .client
            .list_consumers()
            .await
            .map_err(ControlError::from)?
            .into_iter()
            .map(|c| (c.id.clone(), c))
            .collect();

        let mut app_ids = std::collections::HashSet::new();
        let mut offset = 0u64;
        loop {
            let page = self
                .applications
                .list(
                    &ApplicationFilter::default(),
                    &PageRequest {
                        offset,
                        limit: 100,
                        ..PageRequest::default()
                    },
                )
                .await
                .map_err(ControlError::from)?;

            for app in &page.items {
                app_ids.insert(app.id.clone());

                if consumers.contains_key(&app.id) {
                    // Re-register the current key so a rotation that failed
                    // remotely converges. Registration is idempotent.
                    if let Err(e) = self.client.generate_api_key(&app.id, &app.api_key).await {
                        warn!(app = %app.id, error = %e, "key re-registration failed");
                    }
                    continue;
                }

                ControlMetrics::incr(&self.metrics.drift_detected);
                info!(app = %app.id, "consumer missing for application; repairing");
                let consumer = Consumer {
                    id: app.id.clone(),
                    username: app.name.clone(),
                };
                match self.client.create_consumer(&consumer).await {
                    Ok(()) => {
                        if let Err(e) = self.client.generate_api_key(&app.id, &app.api_key).await
                        {
                            warn!(app = %app.id, error = %e, "key registration failed");
                        } else {
                            ControlMetrics::incr(&self.metrics.drift_repaired);
                        }
                    }
                    Err(e) => warn!(app = %app.id, error = %e, "consumer repair failed"),
                }
            }

            offset += page.items.len() as u64;
            if offset >= page.total || page.items.is_empty() {
                break;
            }
        }

        // Orphans: consumers whose application no longer exists.
        for id in consumers.keys() {
            if app_ids.contains(id) {
                continue;
            }
            ControlMetrics::incr(&self.metrics.drift_detected);
            info!(consumer = %id, "orphaned consumer; removing");
            match self.client.delete_consumer(id).await {
                Ok(()) => ControlMetrics::incr(&self.metrics.drift_repaired),
                Err(e) => warn!(consumer = %id, error = %e, "orphan removal failed"),
            }
        }

        Ok(())
    }
}
