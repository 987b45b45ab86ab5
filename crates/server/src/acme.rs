//! ACME lifecycle hooks.
//!
//! Certificate procurement is an external collaborator (an ACME client that
//! writes renewed PEM files in place). This worker owns the control-plane
//! side of the lifecycle: it watches the certificate file for renewal and
//! hot-swaps the rustls config into the running listener, so renewals take
//! effect without a restart.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::listener::load_server_config;

/// Watches the certificate/key files and publishes reloaded TLS configs.
pub struct AcmeWorker {
    cert_path: String,
    key_path: String,
    interval: Duration,
    tls_tx: watch::Sender<Arc<rustls::ServerConfig>>,
    last_modified: Option<SystemTime>,
}

impl AcmeWorker {
    pub fn new(
        cert_path: impl Into<String>,
        key_path: impl Into<String>,
        interval: Duration,
        tls_tx: watch::Sender<Arc<rustls::ServerConfig>>,
    ) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            interval,
            tls_tx,
            last_modified: None,
        }
    }

    /// Spawn the renewal watcher. Dropping the returned sender (or sending
    /// on it) stops the worker; per shutdown ordering it is stopped first.
    pub fn spawn(mut self) -> (tokio::task::JoinHandle<()>, mpsc::Sender<()>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let handle = tokio::spawn(async move {
            let mut timer = tokio::time::interval(self.interval);
            // Baseline mtime without reloading what the listener already has.
            self.last_modified = self.cert_mtime();
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = timer.tick() => self.check_once(),
                    _ = shutdown_rx.recv() => break,
                }
            }
            debug!("acme worker stopped");
        });
        (handle, shutdown_tx)
    }

    fn cert_mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.cert_path)
            .and_then(|m| m.modified())
            .ok()
    }

    /// One renewal check: reload and publish when the certificate changed.
    pub fn check_once(&mut self) {
        let Some(modified) = self.cert_mtime() else {
            warn!(path = %self.cert_path, "certificate file missing");
            return;
        };
        if self.last_modified == Some(modified) {
            return;
        }

        match load_server_config(&self.cert_path, &self.key_path) {
            Ok(config) => {
                if self.tls_tx.send(config).is_ok() {
                    info!(path = %self.cert_path, "renewed certificate loaded");
                }
                self.last_modified = Some(modified);
            }
            Err(e) => {
                // Renewal may be mid-write; retry on the next tick.
                warn!(error = %e, "renewed certificate failed to load");
            }
        }
    }
}
