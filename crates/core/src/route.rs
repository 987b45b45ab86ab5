use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// HTTP methods a route is allowed to match on.
const KNOWN_METHODS: &[&str] = &[
    "GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS", "CONNECT", "TRACE",
];

/// How a path rule is matched against the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum MatchType {
    Exact,
    Prefix,
    Regex,
}

/// A single path matching rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct PathRule {
    /// Match semantics for `value`.
    #[serde(rename = "type")]
    pub match_type: MatchType,
    /// The literal path, path prefix, or regex to match.
    pub value: String,
}

/// A named header or query-string predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct KeyValueMatch {
    pub key: String,
    pub value: String,
}

/// The full matching predicate of a route.
///
/// At least one of `hosts` or `paths` must be non-empty; the remaining
/// dimensions narrow the match further.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RouteRules {
    /// Host names to match (exact).
    #[serde(default)]
    pub hosts: Vec<String>,
    /// Path rules, any of which may match.
    #[serde(default)]
    pub paths: Vec<PathRule>,
    /// HTTP methods; empty means all methods.
    #[serde(default)]
    pub methods: Vec<String>,
    /// Required header values.
    #[serde(default)]
    pub headers: Vec<KeyValueMatch>,
    /// Required query-string values.
    #[serde(default)]
    pub query: Vec<KeyValueMatch>,
}

/// A declarative routing rule binding a match predicate to an upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Route {
    /// Stable identifier; server-assigned when absent on create.
    #[serde(default)]
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Match predicate.
    pub rules: RouteRules,
    /// Identifier of the upstream this route forwards to. Must resolve to
    /// an existing upstream in every persisted state.
    pub upstream_id: String,
    /// Tie-breaker between overlapping routes; higher wins.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Route {
    /// Structural validation: everything that can be checked without
    /// looking at other entities.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.name.trim().is_empty() {
            return Err(ControlError::Validation("route name is required".into()));
        }
        if self.upstream_id.trim().is_empty() {
            return Err(ControlError::Validation(
                "route upstream_id is required".into(),
            ));
        }
        if self.rules.hosts.is_empty() && self.rules.paths.is_empty() {
            return Err(ControlError::Validation(
                "route rules must define at least one host or path".into(),
            ));
        }
        for method in &self.rules.methods {
            if !KNOWN_METHODS.contains(&method.to_ascii_uppercase().as_str()) {
                return Err(ControlError::Validation(format!(
                    "unknown HTTP method: {method}"
                )));
            }
        }
        for path in &self.rules.paths {
            if path.value.is_empty() {
                return Err(ControlError::Validation(
                    "path rule value must not be empty".into(),
                ));
            }
            if path.match_type == MatchType::Regex {
                regex::Regex::new(&path.value).map_err(|e| {
                    ControlError::Validation(format!("invalid path regex '{}': {e}", path.value))
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Route {
        Route {
            id: "r1".into(),
            name: "api".into(),
            rules: RouteRules {
                hosts: vec!["a.example".into()],
                paths: vec![PathRule {
                    match_type: MatchType::Prefix,
                    value: "/api".into(),
                }],
                methods: vec!["GET".into()],
                headers: vec![],
                query: vec![],
            },
            upstream_id: "u1".into(),
            priority: 100,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn valid_route_passes() {
        sample().validate().expect("route should validate");
    }

    #[test]
    fn empty_hosts_and_paths_rejected() {
        let mut route = sample();
        route.rules.hosts.clear();
        route.rules.paths.clear();
        assert!(route.validate().is_err());
    }

    #[test]
    fn unknown_method_rejected() {
        let mut route = sample();
        route.rules.methods = vec!["FETCH".into()];
        assert!(route.validate().is_err());
    }

    #[test]
    fn bad_regex_rejected() {
        let mut route = sample();
        route.rules.paths = vec![PathRule {
            match_type: MatchType::Regex,
            value: "(".into(),
        }];
        assert!(route.validate().is_err());
    }

    #[test]
    fn missing_upstream_id_rejected() {
        let mut route = sample();
        route.upstream_id = String::new();
        assert!(route.validate().is_err());
    }

    #[test]
    fn path_type_serializes_as_type() {
        let route = sample();
        let json = serde_json::to_value(&route).unwrap();
        assert_eq!(json["rules"]["paths"][0]["type"], "prefix");
    }
}
