//! Admin CRUD over plugins.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use portcullis_core::Plugin;

use crate::error::ApiError;

use super::AppState;
use super::schemas::ListParams;

/// Body of `GET /plugins`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct PluginListResponse {
    pub plugins: Vec<Plugin>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// `POST /plugins` -- create a plugin.
#[utoipa::path(
    post,
    path = "/plugins",
    tag = "Plugins",
    summary = "Create a plugin",
    request_body = Plugin,
    responses(
        (status = 201, description = "Plugin created", body = Plugin),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Id already exists"),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Json(plugin): Json<Plugin>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.create_plugin(plugin, "admin").await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /plugins` -- list plugins with pagination.
#[utoipa::path(
    get,
    path = "/plugins",
    tag = "Plugins",
    summary = "List plugins",
    params(ListParams),
    responses((status = 200, description = "Plugin page", body = PluginListResponse))
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .service
        .list_plugins(params.offset, params.limit)
        .await?;
    Ok(Json(PluginListResponse {
        plugins: listing.items,
        total: listing.total,
        limit: listing.limit,
        offset: listing.offset,
    }))
}

/// `GET /plugins/{id}` -- fetch one plugin.
#[utoipa::path(
    get,
    path = "/plugins/{id}",
    tag = "Plugins",
    summary = "Get a plugin",
    params(("id" = String, Path, description = "Plugin id")),
    responses(
        (status = 200, description = "The plugin", body = Plugin),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_plugin(&id).await?))
}

/// `PUT /plugins/{id}` -- replace a plugin.
#[utoipa::path(
    put,
    path = "/plugins/{id}",
    tag = "Plugins",
    summary = "Replace a plugin",
    params(("id" = String, Path, description = "Plugin id")),
    request_body = Plugin,
    responses(
        (status = 200, description = "Updated plugin", body = Plugin),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(plugin): Json<Plugin>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state.service.update_plugin(&id, plugin, "admin").await?,
    ))
}

/// `DELETE /plugins/{id}` -- delete a plugin.
#[utoipa::path(
    delete,
    path = "/plugins/{id}",
    tag = "Plugins",
    summary = "Delete a plugin",
    params(("id" = String, Path, description = "Plugin id")),
    responses(
        (status = 204, description = "Plugin deleted"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_plugin(&id, "admin").await?;
    Ok(StatusCode::NO_CONTENT)
}
