//! Whole-configuration import/export and validation.

use axum::Extension;
use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use serde::Serialize;

use portcullis_core::{ConfigManager, ControlError};

use crate::auth::AdminIdentity;
use crate::error::ApiError;

use super::AppState;

/// Body of `POST /config/validate`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ValidateResponse {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn author(identity: &AdminIdentity) -> &str {
    if identity.id.is_empty() {
        "admin"
    } else {
        &identity.id
    }
}

/// `GET /config` -- export the live configuration as YAML.
#[utoipa::path(
    get,
    path = "/config",
    tag = "Config",
    summary = "Export configuration as YAML",
    responses((status = 200, description = "YAML document"))
)]
pub async fn export(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.service.export_snapshot().await?;
    let manager = ConfigManager::from_snapshot(snapshot)?;
    let bytes = manager.save_to_bytes()?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/yaml")],
        bytes,
    ))
}

/// `POST /config` -- import a YAML document, replacing the live
/// configuration through a new active version.
#[utoipa::path(
    post,
    path = "/config",
    tag = "Config",
    summary = "Import configuration from YAML",
    request_body(content = String, content_type = "application/yaml"),
    responses(
        (status = 200, description = "Imported and activated version"),
        (status = 400, description = "Invalid document"),
    )
)]
pub async fn import(
    State(state): State<AppState>,
    Extension(identity): Extension<AdminIdentity>,
    body: String,
) -> Result<impl IntoResponse, ApiError> {
    let manager = ConfigManager::load_from_bytes(body.as_bytes())?;
    let version = state
        .versions
        .create_version_from(
            manager.snapshot(),
            "configuration import",
            author(&identity),
            Vec::new(),
        )
        .await?;
    let activated = state.versions.activate_version(&version.id).await?;
    Ok(Json(activated))
}

/// `POST /config/validate` -- check a YAML document without applying it.
#[utoipa::path(
    post,
    path = "/config/validate",
    tag = "Config",
    summary = "Validate a YAML configuration document",
    request_body(content = String, content_type = "application/yaml"),
    responses((status = 200, description = "Validation verdict", body = ValidateResponse))
)]
pub async fn validate(body: String) -> impl IntoResponse {
    match ConfigManager::load_from_bytes(body.as_bytes()) {
        Ok(_) => Json(ValidateResponse {
            valid: true,
            message: None,
        }),
        Err(ControlError::Validation(msg) | ControlError::Conflict(msg)) => Json(ValidateResponse {
            valid: false,
            message: Some(msg),
        }),
        Err(e) => Json(ValidateResponse {
            valid: false,
            message: Some(e.to_string()),
        }),
    }
}
