use thiserror::Error;

use portcullis_core::ControlError;

/// Errors from data-plane admin calls.
#[derive(Debug, Error)]
pub enum DataplaneError {
    #[error("connection error: {0}")]
    Connection(String),

    /// The data plane answered with a non-success status.
    #[error("data plane returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl DataplaneError {
    /// Whether a retry could plausibly succeed (transport failures and 5xx).
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection(_) => true,
            Self::Api { status, .. } => *status >= 500,
            Self::Deserialization(_) | Self::Configuration(_) => false,
        }
    }
}

impl From<DataplaneError> for ControlError {
    fn from(err: DataplaneError) -> Self {
        Self::Gateway(err.to_string())
    }
}
