use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Atomic counters tracking control-plane activity.
///
/// All counters use relaxed ordering; call [`snapshot`](Self::snapshot) for
/// a point-in-time view.
#[derive(Debug, Default)]
pub struct ControlMetrics {
    /// Accepted configuration mutations (create/update/delete).
    pub mutations: AtomicU64,
    /// Change events published to subscribers.
    pub published: AtomicU64,
    /// Publish attempts that failed (non-fatal to the request path).
    pub publish_failures: AtomicU64,
    /// Atomic batches published (version activations, imports, recovery).
    pub batches: AtomicU64,
    /// Version activations and rollbacks applied.
    pub versions_applied: AtomicU64,
    /// Reconcile worker passes completed.
    pub reconcile_runs: AtomicU64,
    /// Diff events republished by the reconcile worker.
    pub reconcile_diffs: AtomicU64,
    /// Portal/data-plane divergences detected by the drift worker.
    pub drift_detected: AtomicU64,
    /// Divergences repaired by the drift worker.
    pub drift_repaired: AtomicU64,
}

/// Point-in-time view of [`ControlMetrics`], served by `/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub mutations: u64,
    pub published: u64,
    pub publish_failures: u64,
    pub batches: u64,
    pub versions_applied: u64,
    pub reconcile_runs: u64,
    pub reconcile_diffs: u64,
    pub drift_detected: u64,
    pub drift_repaired: u64,
}

impl ControlMetrics {
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            mutations: self.mutations.load(Ordering::Relaxed),
            published: self.published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            versions_applied: self.versions_applied.load(Ordering::Relaxed),
            reconcile_runs: self.reconcile_runs.load(Ordering::Relaxed),
            reconcile_diffs: self.reconcile_diffs.load(Ordering::Relaxed),
            drift_detected: self.drift_detected.load(Ordering::Relaxed),
            drift_repaired: self.drift_repaired.load(Ordering::Relaxed),
        }
    }

    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }
}
