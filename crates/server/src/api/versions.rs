//! Configuration version lifecycle: create, activate, roll back.

use axum::Extension;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};

use portcullis_core::{ChangeEntry, ConfigVersion, ControlError};

use crate::auth::AdminIdentity;
use crate::error::ApiError;

use super::AppState;

/// Body of `POST /config/versions`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateVersionRequest {
    #[serde(default)]
    pub description: String,
    /// Mutations recorded against this version, for audit purposes.
    #[serde(default)]
    pub changes: Vec<ChangeEntry>,
}

/// Query parameters for listing versions.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListVersionsParams {
    /// Maximum versions to return, newest first. `0` uses the default.
    #[serde(default)]
    pub limit: usize,
}

/// Body of `GET /config/versions`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct VersionListResponse {
    pub versions: Vec<ConfigVersion>,
}

fn author(identity: &AdminIdentity) -> &str {
    if identity.id.is_empty() {
        "admin"
    } else {
        &identity.id
    }
}

/// `POST /config/versions` -- capture the live configuration as a draft.
#[utoipa::path(
    post,
    path = "/config/versions",
    tag = "Versions",
    summary = "Create a draft version from the live configuration",
    request_body = CreateVersionRequest,
    responses((status = 201, description = "Draft version", body = ConfigVersion))
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<AdminIdentity>,
    Json(req): Json<CreateVersionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let version = state
        .versions
        .create_version(&req.description, author(&identity), req.changes)
        .await?;
    Ok((StatusCode::CREATED, Json(version)))
}

/// `GET /config/versions` -- list versions newest-first.
#[utoipa::path(
    get,
    path = "/config/versions",
    tag = "Versions",
    summary = "List versions",
    params(ListVersionsParams),
    responses((status = 200, description = "Versions newest-first", body = VersionListResponse))
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListVersionsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let versions = state.versions.list_versions(params.limit).await?;
    Ok(Json(VersionListResponse { versions }))
}

/// `GET /config/versions/current` -- the active version.
#[utoipa::path(
    get,
    path = "/config/versions/current",
    tag = "Versions",
    summary = "Get the active version",
    responses(
        (status = 200, description = "Active version", body = ConfigVersion),
        (status = 404, description = "No version is active"),
    )
)]
pub async fn current(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let version = state
        .versions
        .get_current()
        .await?
        .ok_or_else(|| ControlError::NotFound("no active version".into()))?;
    Ok(Json(version))
}

/// `GET /config/versions/{id}` -- fetch one version.
#[utoipa::path(
    get,
    path = "/config/versions/{id}",
    tag = "Versions",
    summary = "Get a version",
    params(("id" = String, Path, description = "Version id")),
    responses(
        (status = 200, description = "The version", body = ConfigVersion),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.versions.get_version(&id).await?))
}

/// `POST /config/versions/{id}/activate` -- promote a draft to active.
#[utoipa::path(
    post,
    path = "/config/versions/{id}/activate",
    tag = "Versions",
    summary = "Activate a draft version",
    params(("id" = String, Path, description = "Version id")),
    responses(
        (status = 200, description = "Now-active version", body = ConfigVersion),
        (status = 404, description = "Unknown id"),
        (status = 409, description = "Version is not a draft"),
    )
)]
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.versions.activate_version(&id).await?))
}

/// `POST /config/versions/{id}/rollback` -- roll the live configuration
/// back to this version's snapshot via a synthesized new active version.
#[utoipa::path(
    post,
    path = "/config/versions/{id}/rollback",
    tag = "Versions",
    summary = "Roll back to a version",
    params(("id" = String, Path, description = "Target version id")),
    responses(
        (status = 200, description = "Synthesized active version", body = ConfigVersion),
        (status = 404, description = "Unknown id"),
        (status = 409, description = "Target is already active"),
    )
)]
pub async fn rollback(
    State(state): State<AppState>,
    Extension(identity): Extension<AdminIdentity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state
            .versions
            .rollback_to_version(&id, author(&identity))
            .await?,
    ))
}
