use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::warn;

use portcullis_core::{ConfigSnapshot, ControlError, Plugin, Route, Upstream};
use portcullis_store::keyspace;
use portcullis_store::{ConfigStore, StoreError};

use crate::metrics::ControlMetrics;
use crate::notifier::{ChangeKind, Notifier, PendingChange};

/// Page size used when the caller passes `limit = 0`.
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Hard cap on page size for admin listings.
pub const MAX_PAGE_SIZE: usize = 100;

/// One page of admin-listed entities.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// The single validated mutation path for gateway configuration.
///
/// Every write flows decode → id/timestamps → structural validation →
/// cross-entity checks → store → notifier, in that order. A notifier
/// failure is logged and does not fail the accepted write; the reconcile
/// worker republishes the difference later.
pub struct ConfigService {
    store: Arc<dyn ConfigStore>,
    notifier: Arc<Notifier>,
    metrics: Arc<ControlMetrics>,
}

fn decode<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<T, ControlError> {
    serde_json::from_slice(bytes)
        .map_err(|e| ControlError::Internal(format!("corrupt entity at {key}: {e}")))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, ControlError> {
    serde_json::to_vec(value).map_err(|e| ControlError::Internal(format!("encoding failed: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value).ok()
}

impl ConfigService {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        notifier: Arc<Notifier>,
        metrics: Arc<ControlMetrics>,
    ) -> Self {
        Self {
            store,
            notifier,
            metrics,
        }
    }

    /// The store this service writes through.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConfigStore> {
        &self.store
    }

    /// The notifier announcing this service's writes.
    #[must_use]
    pub fn notifier(&self) -> &Arc<Notifier> {
        &self.notifier
    }

    async fn fetch<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, ControlError> {
        match self.store.get(key).await {
            Ok(bytes) => Ok(Some(decode(key, &bytes)?)),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(ControlError::Store(e.to_string())),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, ControlError> {
        match self.store.get(key).await {
            Ok(_) => Ok(true),
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(ControlError::Store(e.to_string())),
        }
    }

    /// Publish after an accepted write; failures are logged, never fatal.
    async fn announce(&self, change: PendingChange, source: &str) {
        if let Err(e) = self.notifier.publish(change, source).await {
            ControlMetrics::incr(&self.metrics.publish_failures);
            warn!(error = %e, "change notification failed; reconciler will repair");
        }
    }

    async fn list_entities<T: DeserializeOwned>(
        &self,
        prefix: &str,
        offset: usize,
        limit: usize,
    ) -> Result<Listing<T>, ControlError> {
        let entries = self
            .store
            .list(prefix)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;

        let total = entries.len();
        let limit = if limit == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            limit.min(MAX_PAGE_SIZE)
        };

        // The listing is a snapshot ordered by key; page over it once.
        let items = entries
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(key, bytes)| decode(key, bytes))
            .collect::<Result<Vec<T>, _>>()?;

        Ok(Listing {
            items,
            total,
            limit,
            offset,
        })
    }

    // -- Routes ------------------------------------------------------------

    pub async fn create_route(&self, mut route: Route, source: &str) -> Result<Route, ControlError> {
        if route.id.is_empty() {
            route.id = uuid::Uuid::new_v4().to_string();
        }
        let key = keyspace::route_key(&route.id);
        if self.exists(&key).await? {
            return Err(ControlError::Conflict(format!(
                "route {} already exists",
                route.id
            )));
        }

        let now = Utc::now();
        route.created_at = Some(now);
        route.updated_at = Some(now);
        route.validate()?;
        self.require_upstream(&route.upstream_id).await?;

        self.store
            .put(&key, encode(&route)?)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Create,
                key,
                new_value: to_value(&route),
                old_value: None,
            },
            source,
        )
        .await;
        Ok(route)
    }

    pub async fn update_route(
        &self,
        id: &str,
        mut route: Route,
        source: &str,
    ) -> Result<Route, ControlError> {
        let key = keyspace::route_key(id);
        let old: Route = self
            .fetch(&key)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("route {id}")))?;

        route.id = id.to_owned();
        route.created_at = old.created_at;
        route.updated_at = Some(Utc::now());
        route.validate()?;
        self.require_upstream(&route.upstream_id).await?;

        self.store
            .put(&key, encode(&route)?)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Update,
                key,
                new_value: to_value(&route),
                old_value: to_value(&old),
            },
            source,
        )
        .await;
        Ok(route)
    }

    pub async fn delete_route(&self, id: &str, source: &str) -> Result<(), ControlError> {
        let key = keyspace::route_key(id);
        let old: Route = self
            .fetch(&key)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("route {id}")))?;

        self.store
            .delete(&key)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Delete,
                key,
                new_value: None,
                old_value: to_value(&old),
            },
            source,
        )
        .await;
        Ok(())
    }

    pub async fn get_route(&self, id: &str) -> Result<Route, ControlError> {
        self.fetch(&keyspace::route_key(id))
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("route {id}")))
    }

    pub async fn list_routes(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Listing<Route>, ControlError> {
        self.list_entities(keyspace::ROUTES, offset, limit).await
    }

    async fn require_upstream(&self, upstream_id: &str) -> Result<(), ControlError> {
        if !self.exists(&keyspace::upstream_key(upstream_id)).await? {
            return Err(ControlError::Validation(format!(
                "upstream {upstream_id} does not exist"
            )));
        }
        Ok(())
    }

    // -- Upstreams ---------------------------------------------------------

    pub async fn create_upstream(
        &self,
        mut upstream: Upstream,
        source: &str,
    ) -> Result<Upstream, ControlError> {
        if upstream.id.is_empty() {
            upstream.id = uuid::Uuid::new_v4().to_string();
        }
        let key = keyspace::upstream_key(&upstream.id);
        if self.exists(&key).await? {
            return Err(ControlError::Conflict(format!(
                "upstream {} already exists",
                upstream.id
            )));
        }

        let now = Utc::now();
        upstream.created_at = Some(now);
        upstream.updated_at = Some(now);
        upstream.validate()?;

        self.store
            .put(&key, encode(&upstream)?)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Create,
                key,
                new_value: to_value(&upstream),
                old_value: None,
            },
            source,
        )
        .await;
        Ok(upstream)
    }

    pub async fn update_upstream(
        &self,
        id: &str,
        mut upstream: Upstream,
        source: &str,
    ) -> Result<Upstream, ControlError> {
        let key = keyspace::upstream_key(id);
        let old: Upstream = self
            .fetch(&key)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("upstream {id}")))?;

        upstream.id = id.to_owned();
        upstream.created_at = old.created_at;
        upstream.updated_at = Some(Utc::now());
        upstream.validate()?;

        self.store
            .put(&key, encode(&upstream)?)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Update,
                key,
                new_value: to_value(&upstream),
                old_value: to_value(&old),
            },
            source,
        )
        .await;
        Ok(upstream)
    }

    /// Delete an upstream. Fails with a dependency error while any route
    /// still references it.
    pub async fn delete_upstream(&self, id: &str, source: &str) -> Result<(), ControlError> {
        let key = keyspace::upstream_key(id);
        let old: Upstream = self
            .fetch(&key)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("upstream {id}")))?;

        let routes = self
            .store
            .list(keyspace::ROUTES)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        for (route_key, bytes) in &routes {
            let route: Route = decode(route_key, bytes)?;
            if route.upstream_id == id {
                return Err(ControlError::Validation(format!(
                    "upstream {id} is still referenced by route {}",
                    route.id
                )));
            }
        }

        self.store
            .delete(&key)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Delete,
                key,
                new_value: None,
                old_value: to_value(&old),
            },
            source,
        )
        .await;
        Ok(())
    }

    pub async fn get_upstream(&self, id: &str) -> Result<Upstream, ControlError> {
        self.fetch(&keyspace::upstream_key(id))
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("upstream {id}")))
    }

    pub async fn list_upstreams(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Listing<Upstream>, ControlError> {
        self.list_entities(keyspace::UPSTREAMS, offset, limit).await
    }

    // -- Plugins -----------------------------------------------------------

    pub async fn create_plugin(
        &self,
        mut plugin: Plugin,
        source: &str,
    ) -> Result<Plugin, ControlError> {
        if plugin.id.is_empty() {
            plugin.id = uuid::Uuid::new_v4().to_string();
        }
        let key = keyspace::plugin_key(&plugin.id);
        if self.exists(&key).await? {
            return Err(ControlError::Conflict(format!(
                "plugin {} already exists",
                plugin.id
            )));
        }

        let now = Utc::now();
        plugin.created_at = Some(now);
        plugin.updated_at = Some(now);
        plugin.validate()?;
        self.require_plugin_route(&plugin).await?;

        self.store
            .put(&key, encode(&plugin)?)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Create,
                key,
                new_value: to_value(&plugin),
                old_value: None,
            },
            source,
        )
        .await;
        Ok(plugin)
    }

    pub async fn update_plugin(
        &self,
        id: &str,
        mut plugin: Plugin,
        source: &str,
    ) -> Result<Plugin, ControlError> {
        let key = keyspace::plugin_key(id);
        let old: Plugin = self
            .fetch(&key)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("plugin {id}")))?;

        plugin.id = id.to_owned();
        plugin.created_at = old.created_at;
        plugin.updated_at = Some(Utc::now());
        plugin.validate()?;
        self.require_plugin_route(&plugin).await?;

        self.store
            .put(&key, encode(&plugin)?)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Update,
                key,
                new_value: to_value(&plugin),
                old_value: to_value(&old),
            },
            source,
        )
        .await;
        Ok(plugin)
    }

    pub async fn delete_plugin(&self, id: &str, source: &str) -> Result<(), ControlError> {
        let key = keyspace::plugin_key(id);
        let old: Plugin = self
            .fetch(&key)
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("plugin {id}")))?;

        self.store
            .delete(&key)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?;
        ControlMetrics::incr(&self.metrics.mutations);

        self.announce(
            PendingChange {
                kind: ChangeKind::Delete,
                key,
                new_value: None,
                old_value: to_value(&old),
            },
            source,
        )
        .await;
        Ok(())
    }

    pub async fn get_plugin(&self, id: &str) -> Result<Plugin, ControlError> {
        self.fetch(&keyspace::plugin_key(id))
            .await?
            .ok_or_else(|| ControlError::NotFound(format!("plugin {id}")))
    }

    pub async fn list_plugins(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<Listing<Plugin>, ControlError> {
        self.list_entities(keyspace::PLUGINS, offset, limit).await
    }

    async fn require_plugin_route(&self, plugin: &Plugin) -> Result<(), ControlError> {
        if let Some(route_id) = &plugin.route_id {
            if !self.exists(&keyspace::route_key(route_id)).await? {
                return Err(ControlError::Validation(format!(
                    "route {route_id} does not exist"
                )));
            }
        }
        Ok(())
    }

    // -- Whole-configuration views ------------------------------------------

    /// Capture everything under the three entity prefixes.
    pub async fn export_snapshot(&self) -> Result<ConfigSnapshot, ControlError> {
        let mut snapshot = ConfigSnapshot::default();

        for (key, bytes) in self
            .store
            .list(keyspace::ROUTES)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?
        {
            snapshot.routes.push(decode(&key, &bytes)?);
        }
        for (key, bytes) in self
            .store
            .list(keyspace::UPSTREAMS)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?
        {
            snapshot.upstreams.push(decode(&key, &bytes)?);
        }
        for (key, bytes) in self
            .store
            .list(keyspace::PLUGINS)
            .await
            .map_err(|e| ControlError::Store(e.to_string()))?
        {
            snapshot.plugins.push(decode(&key, &bytes)?);
        }

        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use portcullis_core::{Algorithm, MatchType, PathRule, RouteRules, Target};
    use portcullis_store_memory::MemoryConfigStore;

    use crate::notifier::Notification;

    use super::*;

    async fn service() -> ConfigService {
        let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
        let metrics = Arc::new(ControlMetrics::default());
        let notifier = Arc::new(
            Notifier::new(Arc::clone(&store), Arc::clone(&metrics))
                .await
                .unwrap(),
        );
        ConfigService::new(store, notifier, metrics)
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
                hosts: vec!["a.example".into()],
                paths: vec![PathRule {
                    match_type: MatchType::Prefix,
                    value: "/api".into(),
                }],
                ..RouteRules::default()
            },
            upstream_id: upstream_id.into(),
            priority: 100,
            created_at: None,
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn create_route_assigns_id_and_publishes() {
        let svc = service().await;
        let up = svc.create_upstream(upstream("u"), "admin").await.unwrap();

        let mut sub = svc.notifier().subscribe(None).await;
        let created = svc.create_route(route("r1", &up.id), "admin").await.unwrap();
        assert!(!created.id.is_empty());
        assert!(created.created_at.is_some());

        match sub.recv().await.unwrap() {
            Notification::Event(event) => {
                assert_eq!(event.kind, ChangeKind::Create);
                assert_eq!(event.key, keyspace::route_key(&created.id));
                assert!(event.new_value.is_some());
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn dangling_upstream_rejected_without_write_or_event() {
        let svc = service().await;
        let mut sub = svc.notifier().subscribe(None).await;

        let err = svc
            .create_route(route("r1", "nope"), "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));

        let listing = svc.list_routes(0, 0).await.unwrap();
        assert_eq!(listing.total, 0);

        // No event was published for the rejected mutation.
        let nothing =
            tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv()).await;
        assert!(nothing.is_err());
    }

    #[tokio::test]
    async fn delete_referenced_upstream_is_a_dependency_error() {
        let svc = service().await;
        let up = svc.create_upstream(upstream("u"), "admin").await.unwrap();
        svc.create_route(route("r1", &up.id), "admin").await.unwrap();

        let err = svc.delete_upstream(&up.id, "admin").await.unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));
        assert!(svc.get_upstream(&up.id).await.is_ok());
    }

    #[tokio::test]
    async fn create_with_existing_id_conflicts() {
        let svc = service().await;
        let up = svc.create_upstream(upstream("u"), "admin").await.unwrap();
        let created = svc.create_route(route("r1", &up.id), "admin").await.unwrap();

        let mut dup = route("r2", &up.id);
        dup.id = created.id.clone();
        let err = svc.create_route(dup, "admin").await.unwrap_err();
        assert!(matches!(err, ControlError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_preserves_created_at() {
        let svc = service().await;
        let up = svc.create_upstream(upstream("u"), "admin").await.unwrap();
        let created = svc.create_route(route("r1", &up.id), "admin").await.unwrap();

        let updated = svc
            .update_route(&created.id, route("r1-renamed", &up.id), "admin")
            .await
            .unwrap();
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.name, "r1-renamed");
    }

    #[tokio::test]
    async fn listing_pages_and_clamps() {
        let svc = service().await;
        for i in 0..5 {
            svc.create_upstream(upstream(&format!("u{i}")), "admin")
                .await
                .unwrap();
        }

        let listing = svc.list_upstreams(0, 2).await.unwrap();
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.total, 5);

        let listing = svc.list_upstreams(0, 0).await.unwrap();
        assert_eq!(listing.limit, DEFAULT_PAGE_SIZE);

        let listing = svc.list_upstreams(0, 100_000).await.unwrap();
        assert_eq!(listing.limit, MAX_PAGE_SIZE);

        let listing = svc.list_upstreams(50, 10).await.unwrap();
        assert!(listing.items.is_empty());
        assert_eq!(listing.total, 5);
    }
}
