use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// A plugin attached to a single route or applied globally.
///
/// `plugin_type` is an opaque tag as far as the data plane is concerned;
/// the control plane validates `config` for the handful of types it knows
/// the required shape of and passes everything else through untouched.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Plugin {
    /// Stable identifier; server-assigned when absent on create.
    #[serde(default)]
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Plugin type tag, e.g. `rate_limit`, `key_auth`, `cors`.
    #[serde(rename = "type")]
    pub plugin_type: String,
    /// Route this plugin is scoped to; `None` means global.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    /// Whether the data plane should apply this plugin.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Free-form configuration, validated per type.
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = HashMap<String, Object>))]
    pub config: HashMap<String, serde_json::Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl Plugin {
    /// Structural validation, including per-type config checks.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.name.trim().is_empty() {
            return Err(ControlError::Validation("plugin name is required".into()));
        }
        if self.plugin_type.trim().is_empty() {
            return Err(ControlError::Validation("plugin type is required".into()));
        }
        if let Some(route_id) = &self.route_id {
            if route_id.trim().is_empty() {
                return Err(ControlError::Validation(
                    "plugin route_id must not be empty when set".into(),
                ));
            }
        }
        self.validate_config()
    }

    /// Per-type config validation for the types the control plane knows.
    /// Unknown types are accepted verbatim.
    fn validate_config(&self) -> Result<(), ControlError> {
        match self.plugin_type.as_str() {
            "rate_limit" => {
                let rps = self.config.get("requests_per_second");
                match rps.and_then(serde_json::Value::as_u64) {
                    Some(v) if v > 0 => Ok(()),
                    _ => Err(ControlError::Validation(
                        "rate_limit plugin requires a positive requests_per_second".into(),
                    )),
                }
            }
            "key_auth" => {
                // header name defaults on the data plane; if present it must be a string
                match self.config.get("header") {
                    None => Ok(()),
                    Some(v) if v.is_string() => Ok(()),
                    Some(_) => Err(ControlError::Validation(
                        "key_auth plugin header must be a string".into(),
                    )),
                }
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(plugin_type: &str) -> Plugin {
        Plugin {
            id: "p1".into(),
            name: "limiter".into(),
            plugin_type: plugin_type.into(),
            route_id: Some("r1".into()),
            enabled: true,
            config: HashMap::new(),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn unknown_type_passes_with_any_config() {
        let mut plugin = sample("observability");
        plugin
            .config
            .insert("whatever".into(), serde_json::json!({"deep": [1, 2]}));
        plugin.validate().expect("unknown plugin type is opaque");
    }

    #[test]
    fn rate_limit_requires_rps() {
        let mut plugin = sample("rate_limit");
        assert!(plugin.validate().is_err());

        plugin
            .config
            .insert("requests_per_second".into(), serde_json::json!(50));
        plugin.validate().expect("valid rate_limit config");
    }

    #[test]
    fn empty_route_id_rejected() {
        let mut plugin = sample("key_auth");
        plugin.route_id = Some(String::new());
        assert!(plugin.validate().is_err());
    }

    #[test]
    fn type_field_serializes_as_type() {
        let plugin = sample("key_auth");
        let json = serde_json::to_value(&plugin).unwrap();
        assert_eq!(json["type"], "key_auth");
    }
}
