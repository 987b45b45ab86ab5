use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ControlError;

/// Load-balancing algorithm used across an upstream's targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum Algorithm {
    RoundRobin,
    Weighted,
    LeastConn,
    IpHash,
}

/// A single backend address with its balancing weight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Target {
    /// Backend URL, e.g. `http://10.0.0.1:8080`.
    pub url: String,
    /// Relative weight; only meaningful for the weighted algorithm.
    #[serde(default)]
    pub weight: u32,
}

/// Active health-check settings for an upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct HealthCheck {
    /// Probe path, e.g. `/healthz`.
    pub path: String,
    /// Seconds between probes.
    #[serde(default = "default_interval")]
    pub interval_seconds: u64,
    /// Per-probe timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
    /// Consecutive successes before a target is considered healthy.
    #[serde(default = "default_threshold")]
    pub healthy_threshold: u32,
    /// Consecutive failures before a target is considered unhealthy.
    #[serde(default = "default_threshold")]
    pub unhealthy_threshold: u32,
}

fn default_interval() -> u64 {
    10
}

fn default_timeout() -> u64 {
    5
}

fn default_threshold() -> u32 {
    3
}

/// A set of backend targets routes can forward to.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Upstream {
    /// Stable identifier; server-assigned when absent on create.
    #[serde(default)]
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Backend targets; must be non-empty.
    pub targets: Vec<Target>,
    /// Balancing algorithm.
    pub algorithm: Algorithm,
    /// Optional active health checking.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_check: Option<HealthCheck>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Upstream {
    /// Structural validation.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.name.trim().is_empty() {
            return Err(ControlError::Validation("upstream name is required".into()));
        }
        if self.targets.is_empty() {
            return Err(ControlError::Validation(
                "upstream must have at least one target".into(),
            ));
        }
        for target in &self.targets {
            if target.url.trim().is_empty() {
                return Err(ControlError::Validation(
                    "upstream target url must not be empty".into(),
                ));
            }
        }
        if self.algorithm == Algorithm::Weighted {
            let total: u64 = self.targets.iter().map(|t| u64::from(t.weight)).sum();
            if total == 0 {
                return Err(ControlError::Validation(
                    "weighted upstream requires a positive total weight".into(),
                ));
            }
        }
        if let Some(hc) = &self.health_check {
            if hc.path.is_empty() {
                return Err(ControlError::Validation(
                    "health check path must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Upstream {
        Upstream {
            id: "u1".into(),
            name: "backend".into(),
            targets: vec![Target {
                url: "http://10.0.0.1:8080".into(),
                weight: 1,
            }],
            algorithm: Algorithm::RoundRobin,
            health_check: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn valid_upstream_passes() {
        sample().validate().expect("upstream should validate");
    }

    #[test]
    fn empty_targets_rejected() {
        let mut up = sample();
        up.targets.clear();
        assert!(up.validate().is_err());
    }

    #[test]
    fn weighted_requires_positive_weight_sum() {
        let mut up = sample();
        up.algorithm = Algorithm::Weighted;
        up.targets = vec![
            Target {
                url: "http://a".into(),
                weight: 0,
            },
            Target {
                url: "http://b".into(),
                weight: 0,
            },
        ];
        assert!(up.validate().is_err());

        up.targets[0].weight = 5;
        up.validate().expect("positive weight sum should pass");
    }

    #[test]
    fn algorithm_round_trips_snake_case() {
        let json = serde_json::to_string(&Algorithm::LeastConn).unwrap();
        assert_eq!(json, "\"least_conn\"");
        let back: Algorithm = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Algorithm::LeastConn);
    }
}
