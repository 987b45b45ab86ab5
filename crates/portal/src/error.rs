use thiserror::Error;

use portcullis_core::ControlError;

/// Errors from portal repository operations.
#[derive(Debug, Error)]
pub enum PortalError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("not found: {0}")]
    NotFound(String),

    /// Uniqueness violation (email, api key, or id collision).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Referential violation (e.g. application without a user).
    #[error("{0}")]
    Validation(String),

    #[error("backend error: {0}")]
    Backend(String),

    /// The repository has been closed; no further operations are possible.
    #[error("repository is closed")]
    Closed,
}

impl From<PortalError> for ControlError {
    fn from(err: PortalError) -> Self {
        match err {
            PortalError::NotFound(msg) => Self::NotFound(msg),
            PortalError::Conflict(msg) => Self::Conflict(msg),
            PortalError::Validation(msg) => Self::Validation(msg),
            PortalError::Connection(msg) | PortalError::Backend(msg) => Self::Database(msg),
            PortalError::Closed => Self::Database("repository is closed".into()),
        }
    }
}
