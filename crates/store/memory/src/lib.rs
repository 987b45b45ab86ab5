mod store;

pub use store::MemoryConfigStore;
