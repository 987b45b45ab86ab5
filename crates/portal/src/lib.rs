pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod repo;

pub use error::PortalError;
pub use memory::MemoryPortalRepository;
#[cfg(feature = "postgres")]
pub use postgres::{PostgresConfig, PostgresPortalRepository};
pub use repo::{
    ApplicationFilter, ApplicationRepository, Page, PageRequest, PortalRepository,
    PortalTransaction, SortOrder, UserFilter, UserRepository, batch_create_applications,
    batch_create_users, batch_delete_applications, batch_delete_users, batch_update_applications,
    batch_update_users,
};
