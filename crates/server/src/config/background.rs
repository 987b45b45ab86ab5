use serde::Deserialize;

/// Background worker configuration: GitOps sync and reconciliation loops.
#[derive(Debug, Deserialize)]
pub struct BackgroundConfig {
    /// GitOps sync: watch a YAML config file and activate it as versions.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Seconds between store/notifier reconciliation passes.
    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,
    /// Seconds between portal/data-plane drift passes.
    #[serde(default = "default_drift_interval")]
    pub drift_interval_seconds: u64,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            sync: SyncConfig::default(),
            reconcile_interval_seconds: default_reconcile_interval(),
            drift_interval_seconds: default_drift_interval(),
        }
    }
}

/// GitOps sync settings.
#[derive(Debug, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Path of the YAML configuration file to poll.
    #[serde(default = "default_sync_path")]
    pub path: String,
    /// Poll interval in seconds.
    #[serde(default = "default_sync_interval")]
    pub poll_interval_seconds: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            path: default_sync_path(),
            poll_interval_seconds: default_sync_interval(),
        }
    }
}

fn default_sync_path() -> String {
    "gateway.yaml".to_owned()
}

fn default_sync_interval() -> u64 {
    30
}

fn default_reconcile_interval() -> u64 {
    60
}

fn default_drift_interval() -> u64 {
    300
}
