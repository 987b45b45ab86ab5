//! GitOps sync: poll a YAML configuration file and activate changes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use portcullis_control::VersionManager;
use portcullis_core::ConfigManager;

/// Polls a declarative YAML file and, whenever its content changes,
/// activates it as a new configuration version. This is how a git checkout
/// on disk (kept fresh by an external puller) drives the gateway.
pub struct SyncWorker {
    path: PathBuf,
    interval: Duration,
    versions: Arc<VersionManager>,
    last_digest: Option<[u8; 32]>,
}

impl SyncWorker {
    pub fn new(path: impl Into<PathBuf>, interval: Duration, versions: Arc<VersionManager>) -> Self {
        Self {
            path: path.into(),
            interval,
            versions,
            last_digest: None,
        }
    }

    /// Spawn the polling loop. Dropping the returned sender (or sending on
    /// it) stops the worker.
    pub fn spawn(mut self) -> (tokio::task::JoinHandle<()>, mpsc::Sender<()>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = timer.tick() => self.poll_once().await,
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("sync worker stopped");
        });
        (handle, shutdown_tx)
    }

    /// One poll: digest the file, and activate it if the content changed.
    pub async fn poll_once(&mut self) {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = %self.path.display(), error = %e, "sync file not readable");
                return;
            }
        };

        let digest: [u8; 32] = Sha256::digest(&bytes).into();
        if self.last_digest == Some(digest) {
            return;
        }

        let manager = match ConfigManager::load_from_bytes(&bytes) {
            Ok(manager) => manager,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "sync file rejected");
                // Remember the bad content so it is not re-parsed every tick.
                self.last_digest = Some(digest);
                return;
            }
        };

        let result = async {
            let version = self
                .versions
                .create_version_from(
                    manager.snapshot(),
                    "gitops sync",
                    "sync",
                    Vec::new(),
                )
                .await?;
            self.versions.activate_version(&version.id).await
        }
        .await;

        match result {
            Ok(version) => {
                info!(version = %version.version, "synced configuration activated");
                self.last_digest = Some(digest);
            }
            Err(e) => {
                // Leave the digest unset so the next tick retries.
                warn!(error = %e, "sync activation failed");
            }
        }
    }
}
