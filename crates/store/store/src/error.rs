use thiserror::Error;

/// Errors from configuration store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("key not found: {0}")]
    NotFound(String),

    /// Requested watch revision has been compacted out of retained history.
    #[error("revision {0} has been compacted")]
    Compacted(u64),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("store is closed")]
    Closed,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl StoreError {
    /// True for the "key does not exist" case, which callers routinely
    /// branch on rather than propagate.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
