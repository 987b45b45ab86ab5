pub mod drift;
pub mod metrics;
pub mod notifier;
pub mod reconcile;
pub mod service;
pub mod version;

pub use drift::DriftWorker;
pub use metrics::{ControlMetrics, MetricsSnapshot};
pub use notifier::{ChangeEvent, ChangeKind, Notification, Notifier, Subscription};
pub use reconcile::ReconcileWorker;
pub use service::ConfigService;
pub use version::VersionManager;
