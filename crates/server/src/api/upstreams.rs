//! Admin CRUD over upstreams.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use portcullis_core::Upstream;

use crate::error::ApiError;

use super::AppState;
use super::schemas::ListParams;

/// Body of `GET /upstreams`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct UpstreamListResponse {
    pub upstreams: Vec<Upstream>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// `POST /upstreams` -- create an upstream.
#[utoipa::path(
    post,
    path = "/upstreams",
    tag = "Upstreams",
    summary = "Create an upstream",
    request_body = Upstream,
    responses(
        (status = 201, description = "Upstream created", body = Upstream),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Id already exists"),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Json(upstream): Json<Upstream>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.create_upstream(upstream, "admin").await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /upstreams` -- list upstreams with pagination.
#[utoipa::path(
    get,
    path = "/upstreams",
    tag = "Upstreams",
    summary = "List upstreams",
    params(ListParams),
    responses((status = 200, description = "Upstream page", body = UpstreamListResponse))
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state
        .service
        .list_upstreams(params.offset, params.limit)
        .await?;
    Ok(Json(UpstreamListResponse {
        upstreams: listing.items,
        total: listing.total,
        limit: listing.limit,
        offset: listing.offset,
    }))
}

/// `GET /upstreams/{id}` -- fetch one upstream.
#[utoipa::path(
    get,
    path = "/upstreams/{id}",
    tag = "Upstreams",
    summary = "Get an upstream",
    params(("id" = String, Path, description = "Upstream id")),
    responses(
        (status = 200, description = "The upstream", body = Upstream),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_upstream(&id).await?))
}

/// `PUT /upstreams/{id}` -- replace an upstream.
#[utoipa::path(
    put,
    path = "/upstreams/{id}",
    tag = "Upstreams",
    summary = "Replace an upstream",
    params(("id" = String, Path, description = "Upstream id")),
    request_body = Upstream,
    responses(
        (status = 200, description = "Updated upstream", body = Upstream),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(upstream): Json<Upstream>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(
        state.service.update_upstream(&id, upstream, "admin").await?,
    ))
}

/// `DELETE /upstreams/{id}` -- delete an upstream.
///
/// Fails with a validation error while any route still references it.
#[utoipa::path(
    delete,
    path = "/upstreams/{id}",
    tag = "Upstreams",
    summary = "Delete an upstream",
    params(("id" = String, Path, description = "Upstream id")),
    responses(
        (status = 204, description = "Upstream deleted"),
        (status = 400, description = "Still referenced by a route"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_upstream(&id, "admin").await?;
    Ok(StatusCode::NO_CONTENT)
}
