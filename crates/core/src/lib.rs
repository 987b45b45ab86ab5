pub mod error;
pub mod manager;
pub mod plugin;
pub mod portal;
pub mod route;
pub mod upstream;
pub mod version;

pub use error::{ControlError, ErrorKind};
pub use manager::ConfigManager;
pub use plugin::Plugin;
pub use portal::{AccountStatus, Application, User, UserRole};
pub use route::{KeyValueMatch, MatchType, PathRule, Route, RouteRules};
pub use upstream::{Algorithm, HealthCheck, Target, Upstream};
pub use version::{ChangeEntry, ConfigSnapshot, ConfigVersion, VersionStatus};
