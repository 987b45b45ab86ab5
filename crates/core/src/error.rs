use thiserror::Error;

/// Classification for every error the control plane can surface.
///
/// The kind determines both the stable wire code and the HTTP status an
/// error maps to when it reaches an API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Structural or semantic validation failure.
    Validation,
    /// The addressed entity does not exist.
    NotFound,
    /// Uniqueness or id collision.
    Conflict,
    /// Missing or invalid credentials.
    Unauthorized,
    /// The caller is authenticated but lacks rights.
    Permission,
    /// Portal repository failure.
    Database,
    /// Configuration store failure.
    Store,
    /// Downstream data-plane failure.
    Gateway,
    /// Anything unexpected.
    Internal,
}

impl ErrorKind {
    /// Stable machine-readable code carried in error envelopes.
    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Unauthorized => "INVALID_CREDENTIALS",
            Self::Permission => "ACCESS_DENIED",
            Self::Database => "DATABASE_ERROR",
            Self::Store => "STORE_ERROR",
            Self::Gateway => "GATEWAY_ERROR",
            Self::Internal => "INTERNAL_ERROR",
        }
    }

    /// HTTP status this kind maps to.
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Unauthorized => 401,
            Self::Permission => 403,
            Self::Database | Self::Store | Self::Internal => 500,
            Self::Gateway => 502,
        }
    }
}

/// Errors produced by the validated configuration and portal paths.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("{0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Deliberately carries no detail: every credential failure must look
    /// identical to the caller to prevent user enumeration.
    #[error("invalid credentials")]
    Unauthorized,

    #[error("access denied: {0}")]
    Permission(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ControlError {
    /// The taxonomy kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::Permission(_) => ErrorKind::Permission,
            Self::Database(_) => ErrorKind::Database,
            Self::Store(_) => ErrorKind::Store,
            Self::Gateway(_) => ErrorKind::Gateway,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_to_code_and_status() {
        let err = ControlError::Validation("bad".into());
        assert_eq!(err.kind().code(), "VALIDATION_ERROR");
        assert_eq!(err.kind().status(), 400);

        let err = ControlError::NotFound("route x".into());
        assert_eq!(err.kind().code(), "NOT_FOUND");
        assert_eq!(err.kind().status(), 404);

        let err = ControlError::Gateway("boom".into());
        assert_eq!(err.kind().code(), "GATEWAY_ERROR");
        assert_eq!(err.kind().status(), 502);
    }

    #[test]
    fn unauthorized_is_opaque() {
        assert_eq!(ControlError::Unauthorized.to_string(), "invalid credentials");
    }
}
