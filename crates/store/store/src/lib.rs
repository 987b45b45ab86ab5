pub mod error;
pub mod keyspace;
pub mod store;
pub mod testing;

pub use error::StoreError;
pub use store::{ConfigStore, EventKind, WatchEvent, WatchStream};
