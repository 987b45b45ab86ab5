use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;
use crate::plugin::Plugin;
use crate::route::Route;
use crate::upstream::Upstream;

/// Lifecycle state of a configuration version.
///
/// `draft → active`; an active version moves to `archived` when superseded
/// by a newer activation, or to `rolled_back` when a rollback picks a
/// different target. `archived` and `rolled_back` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum VersionStatus {
    Draft,
    Active,
    RolledBack,
    Archived,
}

/// One recorded mutation inside a version's change list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ChangeEntry {
    /// Entity kind: `route`, `upstream`, or `plugin`.
    pub entity: String,
    /// Entity id.
    pub id: String,
    /// Operation: `create`, `update`, or `delete`.
    pub op: String,
}

/// A point-in-time listing of the whole gateway configuration.
///
/// This doubles as the YAML import/export file format.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConfigSnapshot {
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub upstreams: Vec<Upstream>,
    #[serde(default)]
    pub plugins: Vec<Plugin>,
}

impl ConfigSnapshot {
    /// Validate every entity structurally plus the cross-entity rules:
    /// unique ids, route→upstream resolution, plugin→route resolution.
    pub fn validate(&self) -> Result<(), ControlError> {
        let mut upstream_ids = std::collections::HashSet::new();
        for upstream in &self.upstreams {
            upstream.validate()?;
            if !upstream_ids.insert(upstream.id.as_str()) {
                return Err(ControlError::Conflict(format!(
                    "duplicate upstream id: {}",
                    upstream.id
                )));
            }
        }

        let mut route_ids = std::collections::HashSet::new();
        for route in &self.routes {
            route.validate()?;
            if !route_ids.insert(route.id.as_str()) {
                return Err(ControlError::Conflict(format!(
                    "duplicate route id: {}",
                    route.id
                )));
            }
            if !upstream_ids.contains(route.upstream_id.as_str()) {
                return Err(ControlError::Validation(format!(
                    "route {} references unknown upstream {}",
                    route.id, route.upstream_id
                )));
            }
        }

        let mut plugin_ids = std::collections::HashSet::new();
        for plugin in &self.plugins {
            plugin.validate()?;
            if !plugin_ids.insert(plugin.id.as_str()) {
                return Err(ControlError::Conflict(format!(
                    "duplicate plugin id: {}",
                    plugin.id
                )));
            }
            if let Some(route_id) = &plugin.route_id {
                if !route_ids.contains(route_id.as_str()) {
                    return Err(ControlError::Validation(format!(
                        "plugin {} references unknown route {route_id}",
                        plugin.id
                    )));
                }
            }
        }

        Ok(())
    }

    /// True when no entities are present at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.upstreams.is_empty() && self.plugins.is_empty()
    }
}

/// A named, versioned snapshot with status and lineage metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ConfigVersion {
    /// Stable identifier.
    pub id: String,
    /// Monotone human-facing version string, e.g. `v42`.
    pub version: String,
    /// Free-form description supplied at creation.
    pub description: String,
    /// Who created the version.
    pub author: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Mutations recorded against this version.
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
    /// The captured configuration.
    pub snapshot: ConfigSnapshot,
    /// Lifecycle status.
    pub status: VersionStatus,
    /// Lineage and operator metadata (`rollback_from`, `rollback_to`, ...).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
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

    #[test]
    fn snapshot_with_resolved_references_passes() {
        let snapshot = ConfigSnapshot {
            routes: vec![route("r1", "u1")],
            upstreams: vec![upstream("u1")],
            plugins: vec![],
        };
        snapshot.validate().expect("snapshot should validate");
    }

    #[test]
    fn dangling_upstream_reference_rejected() {
        let snapshot = ConfigSnapshot {
            routes: vec![route("r1", "nope")],
            upstreams: vec![upstream("u1")],
            plugins: vec![],
        };
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn duplicate_route_id_rejected() {
        let snapshot = ConfigSnapshot {
            routes: vec![route("r1", "u1"), route("r1", "u1")],
            upstreams: vec![upstream("u1")],
            plugins: vec![],
        };
        assert!(matches!(
            snapshot.validate(),
            Err(ControlError::Conflict(_))
        ));
    }

    #[test]
    fn version_status_round_trips() {
        let json = serde_json::to_string(&VersionStatus::RolledBack).unwrap();
        assert_eq!(json, "\"rolled_back\"");
    }
}
