use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use portcullis_core::{ChangeEntry, ConfigSnapshot, ConfigVersion, ControlError, VersionStatus};
use portcullis_store::keyspace;

use crate::metrics::ControlMetrics;
use crate::notifier::{ChangeKind, PendingChange};
use crate::service::ConfigService;

/// Default number of versions returned by a listing.
const DEFAULT_LIST_LIMIT: usize = 20;

/// Captures, activates, and rolls back whole-configuration snapshots.
///
/// Every state transition and snapshot apply runs under one exclusive
/// lock, and each apply is announced to subscribers as a single atomic
/// notifier batch, so the data plane never acts on a torn intermediate
/// state even though the store itself is mutated prefix by prefix.
pub struct VersionManager {
    service: Arc<ConfigService>,
    metrics: Arc<ControlMetrics>,
    lock: tokio::sync::Mutex<()>,
}

impl VersionManager {
    pub fn new(service: Arc<ConfigService>, metrics: Arc<ControlMetrics>) -> Self {
        Self {
            service,
            metrics,
            lock: tokio::sync::Mutex::new(()),
        }
    }

    async fn store_version(&self, version: &ConfigVersion) -> Result<(), ControlError> {
        let bytes = serde_json::to_vec(version)
            .map_err(|e| ControlError::Internal(format!("version encoding failed: {e}")))?;
        self.service
            .store()
            .put(&keyspace::version_key(&version.id), bytes)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))
    }

    async fn load_version(&self, id: &str) -> Result<ConfigVersion, ControlError> {
        let key = keyspace::version_key(id);
        match self.service.store().get(&key).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| ControlError::Internal(format!("corrupt version {id}: {e}"))),
            Err(portcullis_store::StoreError::NotFound(_)) => {
                Err(ControlError::NotFound(format!("version {id}")))
            }
            Err(e) => Err(ControlError::Store(e.to_string())),
        }
    }

    async fn load_all(&self) -> Result<Vec<ConfigVersion>, ControlError> {
        let entries = self
            .service
            .store()
            .list(keyspace::VERSIONS)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;

        entries
            .iter()
            .map(|(key, bytes)| {
                serde_json::from_slice(bytes)
                    .map_err(|e| ControlError::Internal(format!("corrupt version at {key}: {e}")))
            })
            .collect()
    }

    /// Next monotone version string: one past the highest existing `v<n>`.
    fn next_version_string(versions: &[ConfigVersion]) -> String {
        let max = versions
            .iter()
            .filter_map(|v| v.version.strip_prefix('v'))
            .filter_map(|n| n.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        format!("v{}", max + 1)
    }

    /// Capture the current store configuration into a new draft version.
    pub async fn create_version(
        &self,
        description: &str,
        author: &str,
        changes: Vec<ChangeEntry>,
    ) -> Result<ConfigVersion, ControlError> {
        let snapshot = self.service.export_snapshot().await?;
        self.create_version_from(snapshot, description, author, changes)
            .await
    }

    /// Create a draft version around a supplied snapshot (used by the YAML
    /// import path). The snapshot is fully validated first.
    pub async fn create_version_from(
        &self,
        snapshot: ConfigSnapshot,
        description: &str,
        author: &str,
        changes: Vec<ChangeEntry>,
    ) -> Result<ConfigVersion, ControlError> {
        snapshot.validate()?;

        let _guard = self.lock.lock().await;
        let versions = self.load_all().await?;
        let version = ConfigVersion {
            id: uuid::Uuid::new_v4().to_string(),
            version: Self::next_version_string(&versions),
            description: description.to_owned(),
            author: author.to_owned(),
            timestamp: Utc::now(),
            changes,
            snapshot,
            status: VersionStatus::Draft,
            metadata: HashMap::new(),
        };
        self.store_version(&version).await?;
        info!(id = %version.id, version = %version.version, "configuration version created");
        Ok(version)
    }

    /// Versions newest-first. `limit = 0` uses the default.
    pub async fn list_versions(&self, limit: usize) -> Result<Vec<ConfigVersion>, ControlError> {
        let mut versions = self.load_all().await?;
        versions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.version.cmp(&a.version)));
        let limit = if limit == 0 { DEFAULT_LIST_LIMIT } else { limit };
        versions.truncate(limit);
        Ok(versions)
    }

    pub async fn get_version(&self, id: &str) -> Result<ConfigVersion, ControlError> {
        self.load_version(id).await
    }

    /// The version currently marked active, if any.
    pub async fn get_current(&self) -> Result<Option<ConfigVersion>, ControlError> {
        let versions = self.load_all().await?;
        Ok(versions
            .into_iter()
            .find(|v| v.status == VersionStatus::Active))
    }

    /// Promote a draft to active, archiving the previous active version and
    /// replacing the whole live configuration with the draft's snapshot.
    pub async fn activate_version(&self, id: &str) -> Result<ConfigVersion, ControlError> {
        let _guard = self.lock.lock().await;

        let mut target = self.load_version(id).await?;
        match target.status {
            VersionStatus::Draft => {}
            VersionStatus::Active => {
                return Err(ControlError::Conflict(format!("version {id} is already active")));
            }
            VersionStatus::Archived | VersionStatus::RolledBack => {
                return Err(ControlError::Conflict(format!(
                    "version {id} is terminal and cannot be activated; roll back to it instead"
                )));
            }
        }

        if let Some(mut current) = self.find_active().await? {
            current.status = VersionStatus::Archived;
            self.store_version(&current).await?;
        }

        // Mark active before the apply: a crash mid-apply is repaired by
        // re-applying the active snapshot on restart.
        target.status = VersionStatus::Active;
        self.store_version(&target).await?;

        self.apply_snapshot(&target.snapshot, "version").await?;
        ControlMetrics::incr(&self.metrics.versions_applied);
        info!(id = %target.id, version = %target.version, "configuration version activated");
        Ok(target)
    }

    /// Roll the live configuration back to an earlier version's snapshot.
    ///
    /// A *new* active version is synthesized around the target's snapshot;
    /// the previously active version is left `rolled_back` and the target
    /// itself keeps its terminal status.
    pub async fn rollback_to_version(
        &self,
        id: &str,
        author: &str,
    ) -> Result<ConfigVersion, ControlError> {
        let _guard = self.lock.lock().await;

        let target = self.load_version(id).await?;
        if target.status == VersionStatus::Active {
            return Err(ControlError::Conflict(format!("version {id} is already active")));
        }

        let current = self.find_active().await?;
        let mut metadata = HashMap::new();
        metadata.insert("rollback_to".to_owned(), target.id.clone());
        if let Some(current) = &current {
            metadata.insert("rollback_from".to_owned(), current.id.clone());
        }

        if let Some(mut current) = current {
            current.status = VersionStatus::RolledBack;
            self.store_version(&current).await?;
        }

        let versions = self.load_all().await?;
        let synthesized = ConfigVersion {
            id: uuid::Uuid::new_v4().to_string(),
            version: Self::next_version_string(&versions),
            description: format!("rollback to {}", target.version),
            author: author.to_owned(),
            timestamp: Utc::now(),
            changes: Vec::new(),
            snapshot: target.snapshot.clone(),
            status: VersionStatus::Active,
            metadata,
        };
        self.store_version(&synthesized).await?;

        self.apply_snapshot(&synthesized.snapshot, "version").await?;
        ControlMetrics::incr(&self.metrics.versions_applied);
        info!(
            from = metadata_get(&synthesized, "rollback_from"),
            to = %target.id,
            "configuration rolled back"
        );
        Ok(synthesized)
    }

    /// Startup recovery: re-apply the snapshot of whatever version is
    /// marked active, repairing a crash that interrupted an apply.
    pub async fn recover(&self) -> Result<(), ControlError> {
        let _guard = self.lock.lock().await;
        if let Some(active) = self.find_active().await? {
            info!(id = %active.id, version = %active.version, "re-applying active version snapshot");
            self.apply_snapshot(&active.snapshot, "recovery").await?;
        }
        Ok(())
    }

    async fn find_active(&self) -> Result<Option<ConfigVersion>, ControlError> {
        let versions = self.load_all().await?;
        Ok(versions
            .into_iter()
            .find(|v| v.status == VersionStatus::Active))
    }

    /// Clear-then-put the three entity prefixes to match `snapshot`, then
    /// announce everything as one atomic batch. Callers hold the manager
    /// lock.
    async fn apply_snapshot(
        &self,
        snapshot: &ConfigSnapshot,
        source: &str,
    ) -> Result<(), ControlError> {
        let store = self.service.store();
        let mut changes: Vec<PendingChange> = Vec::new();

        let mut desired: HashMap<String, serde_json::Value> = HashMap::new();
        for route in &snapshot.routes {
            desired.insert(
                keyspace::route_key(&route.id),
                serde_json::to_value(route)
                    .map_err(|e| ControlError::Internal(e.to_string()))?,
            );
        }
        for upstream in &snapshot.upstreams {
            desired.insert(
                keyspace::upstream_key(&upstream.id),
                serde_json::to_value(upstream)
                    .map_err(|e| ControlError::Internal(e.to_string()))?,
            );
        }
        for plugin in &snapshot.plugins {
            desired.insert(
                keyspace::plugin_key(&plugin.id),
                serde_json::to_value(plugin)
                    .map_err(|e| ControlError::Internal(e.to_string()))?,
            );
        }

        for prefix in [keyspace::ROUTES, keyspace::UPSTREAMS, keyspace::PLUGINS] {
            let existing = store
                .list(prefix)
                .await
                .map_err(|e| ControlError::Store(e.to_string()))?;

            for (key, bytes) in existing {
                let old_value = serde_json::from_slice(&bytes).ok();
                if let Some(new_value) = desired.remove(&key) {
                    store
                        .put(&key, serde_json::to_vec(&new_value).unwrap_or_default())
                        .await
                        .map_err(|e| ControlError::Store(e.to_string()))?;
                    changes.push(PendingChange {
                        kind: ChangeKind::Update,
                        key,
                        new_value: Some(new_value),
                        old_value,
                    });
                } else {
                    store
                        .delete(&key)
                        .await
                        .map_err(|e| ControlError::Store(e.to_string()))?;
                    changes.push(PendingChange {
                        kind: ChangeKind::Delete,
                        key,
                        new_value: None,
                        old_value,
                    });
                }
            }
        }

        // Whatever remains in `desired` did not exist before.
        for (key, new_value) in desired {
            store
                .put(&key, serde_json::to_vec(&new_value).unwrap_or_default())
                .await
                .map_err(|e| ControlError::Store(e.to_string()))?;
            changes.push(PendingChange {
                kind: ChangeKind::Create,
                key,
                new_value: Some(new_value),
                old_value: None,
            });
        }

        self.service.notifier().publish_batch(changes, source).await
    }
}

fn metadata_get<'a>(version: &'a ConfigVersion, key: &str) -> &'a str {
    version.metadata.get(key).map_or("", String::as_str)
}

#[cfg(test)]
mod tests {
    use portcullis_core::{Algorithm, MatchType, PathRule, Route, RouteRules, Target, Upstream};
    use portcullis_store::ConfigStore;
    use portcullis_store_memory::MemoryConfigStore;

    use crate::notifier::{Notification, Notifier};

    use super::*;

    async fn setup() -> (Arc<ConfigService>, VersionManager) {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let metrics = Arc::new(ControlMetrics::default());
        let notifier = Arc::new(
            Notifier::new(Arc::clone(&store), Arc::clone(&metrics))
                .await
                .unwrap(),
        );
        let service = Arc::new(ConfigService::new(store, notifier, Arc::clone(&metrics)));
        let manager = VersionManager::new(Arc::clone(&service), metrics);
        (service, manager)
    }

    fn upstream(name: &str) -> Upstream {
        Upstream {
            id: String::new(),
            name: name.into(),
            targets: vec![Target {
                url: "http://127.0.0.1:9000".into(),
                weight: 1,
            }],
            algorithm: Algorithm::RoundRobin,
            health_check: None,
            created_at: None,
            updated_at: None,
        }
    }

    fn route(name: &str, upstream_id: &str) -> Route {
        Route {
            id: String::new(),
            name: name.into(),
            rules: RouteRules {
                paths: vec![PathRule {
                    match_type: MatchType::Prefix,
                    value: "/".into(),
                }],
                ..RouteRules::default()
            },
            upstream_id: upstream_id.into(),
            priority: 0,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn at_most_one_active_version() {
        let (service, manager) = setup().await;
        service.create_upstream(upstream("u1"), "admin").await.unwrap();

        let v1 = manager.create_version("first", "alice", vec![]).await.unwrap();
        let v2 = manager.create_version("second", "alice", vec![]).await.unwrap();

        manager.activate_version(&v1.id).await.unwrap();
        manager.activate_version(&v2.id).await.unwrap();

        let versions = manager.list_versions(0).await.unwrap();
        let active: Vec<_> = versions
            .iter()
            .filter(|v| v.status == VersionStatus::Active)
            .collect();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, v2.id);

        let archived = versions.iter().find(|v| v.id == v1.id).unwrap();
        assert_eq!(archived.status, VersionStatus::Archived);
    }

    #[tokio::test]
    async fn rollback_synthesizes_new_active_version() {
        let (service, manager) = setup().await;

        // State S1: one upstream.
        let up = service.create_upstream(upstream("u1"), "admin").await.unwrap();
        let v1 = manager.create_version("S1", "alice", vec![]).await.unwrap();
        manager.activate_version(&v1.id).await.unwrap();

        // State S2: add a route.
        let r = service.create_route(route("r1", &up.id), "admin").await.unwrap();
        let v2 = manager.create_version("S2", "alice", vec![]).await.unwrap();
        manager.activate_version(&v2.id).await.unwrap();

        let v3 = manager.rollback_to_version(&v1.id, "bob").await.unwrap();
        assert_eq!(v3.status, VersionStatus::Active);
        assert_eq!(v3.metadata.get("rollback_to"), Some(&v1.id));
        assert_eq!(v3.metadata.get("rollback_from"), Some(&v2.id));

        let v2_after = manager.get_version(&v2.id).await.unwrap();
        assert_eq!(v2_after.status, VersionStatus::RolledBack);

        // Live routes now equal S1: the route is gone.
        let routes = service.list_routes(0, 0).await.unwrap();
        assert_eq!(routes.total, 0, "route {} should be gone", r.id);
        assert_eq!(service.list_upstreams(0, 0).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn rollback_to_unknown_version_leaves_active_untouched() {
        let (service, manager) = setup().await;
        service.create_upstream(upstream("u1"), "admin").await.unwrap();
        let v1 = manager.create_version("S1", "alice", vec![]).await.unwrap();
        manager.activate_version(&v1.id).await.unwrap();

        let err = manager
            .rollback_to_version("does-not-exist", "bob")
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::NotFound(_)));

        let current = manager.get_current().await.unwrap().unwrap();
        assert_eq!(current.id, v1.id);
    }

    #[tokio::test]
    async fn activation_publishes_one_atomic_batch() {
        let (service, manager) = setup().await;
        let up = service.create_upstream(upstream("u1"), "admin").await.unwrap();
        service.create_route(route("r1", &up.id), "admin").await.unwrap();

        let version = manager.create_version("S", "alice", vec![]).await.unwrap();

        let mut sub = service.notifier().subscribe(None).await;
        manager.activate_version(&version.id).await.unwrap();

        match sub.recv().await.unwrap() {
            Notification::Batch(events) => {
                assert_eq!(events.len(), 2);
                let mut seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
                seqs.sort_unstable();
                assert_eq!(seqs[1], seqs[0] + 1, "batch seq range must be contiguous");
            }
            other => panic!("expected atomic batch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn activating_terminal_version_conflicts() {
        let (service, manager) = setup().await;
        service.create_upstream(upstream("u1"), "admin").await.unwrap();
        let v1 = manager.create_version("S1", "alice", vec![]).await.unwrap();
        let v2 = manager.create_version("S2", "alice", vec![]).await.unwrap();
        manager.activate_version(&v1.id).await.unwrap();
        manager.activate_version(&v2.id).await.unwrap();

        // v1 is now archived, a terminal state.
        let err = manager.activate_version(&v1.id).await.unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)));
    }

    #[tokio::test]
    async fn version_strings_are_monotone() {
        let (service, manager) = setup().await;
        service.create_upstream(upstream("u1"), "admin").await.unwrap();

        let v1 = manager.create_version("a", "alice", vec![]).await.unwrap();
        let v2 = manager.create_version("b", "alice", vec![]).await.unwrap();
        assert_eq!(v1.version, "v1");
        assert_eq!(v2.version, "v2");
    }
}
