use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use portcullis_core::{ControlError, ErrorKind};

/// Wire shape of every error the server emits.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorEnvelope {
    /// Short category name, e.g. `"validation"`.
    pub error: String,
    /// Human-readable description.
    pub message: String,
    /// Stable machine-readable code, e.g. `"VALIDATION_ERROR"`.
    pub code: String,
    /// HTTP status, mirrored into the body for log pipelines.
    pub status: u16,
    /// Optional structured detail.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub details: Option<serde_json::Value>,
}

/// Errors surfaced by HTTP handlers.
///
/// Everything funnels through [`ControlError`]'s taxonomy; database, store,
/// and gateway causes are logged here and surfaced as sanitized envelopes,
/// while validation and permission errors pass through verbatim.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub ControlError);

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Validation => "validation",
        ErrorKind::NotFound => "not_found",
        ErrorKind::Conflict => "conflict",
        ErrorKind::Unauthorized => "unauthorized",
        ErrorKind::Permission => "permission",
        ErrorKind::Database => "database",
        ErrorKind::Store => "store",
        ErrorKind::Gateway => "gateway",
        ErrorKind::Internal => "internal",
    }
}

impl ApiError {
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        let kind = self.0.kind();
        let message = match kind {
            // Backend causes are logged with detail, surfaced sanitized.
            ErrorKind::Database => "database operation failed".to_owned(),
            ErrorKind::Store => "configuration store operation failed".to_owned(),
            ErrorKind::Gateway => "data plane request failed".to_owned(),
            ErrorKind::Internal => "internal error".to_owned(),
            _ => self.0.to_string(),
        };
        ErrorEnvelope {
            error: kind_label(kind).to_owned(),
            message,
            code: kind.code().to_owned(),
            status: kind.status(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        match kind {
            ErrorKind::Database | ErrorKind::Store | ErrorKind::Gateway | ErrorKind::Internal => {
                tracing::error!(error = %self.0, code = kind.code(), "request failed");
            }
            _ => {
                tracing::debug!(error = %self.0, code = kind.code(), "request rejected");
            }
        }

        let envelope = self.envelope();
        let status =
            StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_passes_through_verbatim() {
        let err = ApiError(ControlError::Validation("name is required".into()));
        let env = err.envelope();
        assert_eq!(env.code, "VALIDATION_ERROR");
        assert_eq!(env.status, 400);
        assert_eq!(env.message, "name is required");
    }

    #[test]
    fn store_errors_are_sanitized() {
        let err = ApiError(ControlError::Store("etcd endpoint 10.0.0.3 refused".into()));
        let env = err.envelope();
        assert_eq!(env.code, "STORE_ERROR");
        assert_eq!(env.status, 500);
        assert!(!env.message.contains("10.0.0.3"));
    }

    #[test]
    fn credential_failures_are_opaque() {
        let env = ApiError(ControlError::Unauthorized).envelope();
        assert_eq!(env.code, "INVALID_CREDENTIALS");
        assert_eq!(env.status, 401);
        assert_eq!(env.message, "invalid credentials");
    }
}
