use std::collections::BTreeMap;

use crate::error::ControlError;
use crate::plugin::Plugin;
use crate::route::Route;
use crate::upstream::Upstream;
use crate::version::ConfigSnapshot;

/// In-memory working set of gateway configuration.
///
/// Used by the YAML import/export path and by the GitOps sync loop to build
/// and check a candidate configuration before it touches the store. All
/// mutations enforce the same referential rules the persisted path does.
#[derive(Debug, Default)]
pub struct ConfigManager {
    routes: BTreeMap<String, Route>,
    upstreams: BTreeMap<String, Upstream>,
    plugins: BTreeMap<String, Plugin>,
}

impl ConfigManager {
    /// Create an empty working set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a working set from an existing snapshot, validating it.
    pub fn from_snapshot(snapshot: ConfigSnapshot) -> Result<Self, ControlError> {
        snapshot.validate()?;
        let mut manager = Self::new();
        for upstream in snapshot.upstreams {
            manager.upstreams.insert(upstream.id.clone(), upstream);
        }
        for route in snapshot.routes {
            manager.routes.insert(route.id.clone(), route);
        }
        for plugin in snapshot.plugins {
            manager.plugins.insert(plugin.id.clone(), plugin);
        }
        Ok(manager)
    }

    /// Parse and validate a YAML document into a working set.
    pub fn load_from_bytes(data: &[u8]) -> Result<Self, ControlError> {
        let snapshot: ConfigSnapshot = serde_yaml_ng::from_slice(data)
            .map_err(|e| ControlError::Validation(format!("invalid config YAML: {e}")))?;
        Self::from_snapshot(snapshot)
    }

    /// Serialize the working set back to the YAML file format.
    pub fn save_to_bytes(&self) -> Result<Vec<u8>, ControlError> {
        let doc = serde_yaml_ng::to_string(&self.snapshot())
            .map_err(|e| ControlError::Internal(format!("config YAML encoding failed: {e}")))?;
        Ok(doc.into_bytes())
    }

    /// The current working set as a snapshot, sorted by id.
    #[must_use]
    pub fn snapshot(&self) -> ConfigSnapshot {
        ConfigSnapshot {
            routes: self.routes.values().cloned().collect(),
            upstreams: self.upstreams.values().cloned().collect(),
            plugins: self.plugins.values().cloned().collect(),
        }
    }

    pub fn add_upstream(&mut self, upstream: Upstream) -> Result<(), ControlError> {
        upstream.validate()?;
        self.upstreams.insert(upstream.id.clone(), upstream);
        Ok(())
    }

    pub fn add_route(&mut self, route: Route) -> Result<(), ControlError> {
        route.validate()?;
        if !self.upstreams.contains_key(&route.upstream_id) {
            return Err(ControlError::Validation(format!(
                "route {} references unknown upstream {}",
                route.id, route.upstream_id
            )));
        }
        self.routes.insert(route.id.clone(), route);
        Ok(())
    }

    pub fn add_plugin(&mut self, plugin: Plugin) -> Result<(), ControlError> {
        plugin.validate()?;
        if let Some(route_id) = &plugin.route_id {
            if !self.routes.contains_key(route_id) {
                return Err(ControlError::Validation(format!(
                    "plugin {} references unknown route {route_id}",
                    plugin.id
                )));
            }
        }
        self.plugins.insert(plugin.id.clone(), plugin);
        Ok(())
    }

    pub fn remove_route(&mut self, id: &str) -> Result<Route, ControlError> {
        self.routes
            .remove(id)
            .ok_or_else(|| ControlError::NotFound(format!("route {id}")))
    }

    /// Removing an upstream that any route still points at is a dependency
    /// error, not a cascade.
    pub fn remove_upstream(&mut self, id: &str) -> Result<Upstream, ControlError> {
        if let Some(route) = self.routes.values().find(|r| r.upstream_id == id) {
            return Err(ControlError::Validation(format!(
                "upstream {id} is still referenced by route {}",
                route.id
            )));
        }
        self.upstreams
            .remove(id)
            .ok_or_else(|| ControlError::NotFound(format!("upstream {id}")))
    }

    pub fn remove_plugin(&mut self, id: &str) -> Result<Plugin, ControlError> {
        self.plugins
            .remove(id)
            .ok_or_else(|| ControlError::NotFound(format!("plugin {id}")))
    }

    #[must_use]
    pub fn get_route(&self, id: &str) -> Option<&Route> {
        self.routes.get(id)
    }

    #[must_use]
    pub fn get_upstream(&self, id: &str) -> Option<&Upstream> {
        self.upstreams.get(id)
    }

    #[must_use]
    pub fn get_plugin(&self, id: &str) -> Option<&Plugin> {
        self.plugins.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::{MatchType, PathRule, RouteRules};
    use crate::upstream::{Algorithm, Target};

    fn upstream(id: &str) -> Upstream {
        Upstream {
            id: id.into(),
            name: format!("up-{id}"),
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

    fn route(id: &str, upstream_id: &str) -> Route {
        Route {
            id: id.into(),
            name: format!("route-{id}"),
            rules: RouteRules {
                paths: vec![PathRule {
                    match_type: MatchType::Prefix,
                    value: "/api".into(),
                }],
                ..RouteRules::default()
            },
            upstream_id: upstream_id.into(),
            priority: 0,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn add_route_requires_existing_upstream() {
        let mut manager = ConfigManager::new();
        assert!(manager.add_route(route("r1", "u1")).is_err());

        manager.add_upstream(upstream("u1")).unwrap();
        manager.add_route(route("r1", "u1")).unwrap();
        assert!(manager.get_route("r1").is_some());
    }

    #[test]
    fn remove_referenced_upstream_fails() {
        let mut manager = ConfigManager::new();
        manager.add_upstream(upstream("u1")).unwrap();
        manager.add_route(route("r1", "u1")).unwrap();

        let err = manager.remove_upstream("u1").unwrap_err();
        assert!(matches!(err, ControlError::Validation(_)));

        manager.remove_route("r1").unwrap();
        manager.remove_upstream("u1").unwrap();
    }

    #[test]
    fn yaml_round_trip() {
        let mut manager = ConfigManager::new();
        manager.add_upstream(upstream("u1")).unwrap();
        manager.add_route(route("r1", "u1")).unwrap();

        let bytes = manager.save_to_bytes().unwrap();
        let reloaded = ConfigManager::load_from_bytes(&bytes).unwrap();
        assert!(reloaded.get_route("r1").is_some());
        assert!(reloaded.get_upstream("u1").is_some());
    }

    #[test]
    fn load_rejects_dangling_reference() {
        let yaml = br"
routes:
  - id: r1
    name: r1
    rules:
      paths:
        - type: prefix
          value: /
    upstream_id: missing
upstreams: []
plugins: []
";
        assert!(ConfigManager::load_from_bytes(yaml).is_err());
    }
}
