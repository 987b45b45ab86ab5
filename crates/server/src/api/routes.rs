//! Admin CRUD over routes.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use portcullis_core::Route;

use crate::error::ApiError;

use super::AppState;
use super::schemas::ListParams;

/// Body of `GET /routes`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RouteListResponse {
    pub routes: Vec<Route>,
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

/// `POST /routes` -- create a route.
#[utoipa::path(
    post,
    path = "/routes",
    tag = "Routes",
    summary = "Create a route",
    request_body = Route,
    responses(
        (status = 201, description = "Route created", body = Route),
        (status = 400, description = "Validation error"),
        (status = 409, description = "Id already exists"),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Json(route): Json<Route>,
) -> Result<impl IntoResponse, ApiError> {
    let created = state.service.create_route(route, "admin").await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /routes` -- list routes with pagination.
#[utoipa::path(
    get,
    path = "/routes",
    tag = "Routes",
    summary = "List routes",
    params(ListParams),
    responses((status = 200, description = "Route page", body = RouteListResponse))
)]
pub async fn list(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<impl IntoResponse, ApiError> {
    let listing = state.service.list_routes(params.offset, params.limit).await?;
    Ok(Json(RouteListResponse {
        routes: listing.items,
        total: listing.total,
        limit: listing.limit,
        offset: listing.offset,
    }))
}

/// `GET /routes/{id}` -- fetch one route.
#[utoipa::path(
    get,
    path = "/routes/{id}",
    tag = "Routes",
    summary = "Get a route",
    params(("id" = String, Path, description = "Route id")),
    responses(
        (status = 200, description = "The route", body = Route),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn get_one(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.get_route(&id).await?))
}

/// `PUT /routes/{id}` -- replace a route.
#[utoipa::path(
    put,
    path = "/routes/{id}",
    tag = "Routes",
    summary = "Replace a route",
    params(("id" = String, Path, description = "Route id")),
    request_body = Route,
    responses(
        (status = 200, description = "Updated route", body = Route),
        (status = 400, description = "Validation error"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(route): Json<Route>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.update_route(&id, route, "admin").await?))
}

/// `DELETE /routes/{id}` -- delete a route.
#[utoipa::path(
    delete,
    path = "/routes/{id}",
    tag = "Routes",
    summary = "Delete a route",
    params(("id" = String, Path, description = "Route id")),
    responses(
        (status = 204, description = "Route deleted"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.delete_route(&id, "admin").await?;
    Ok(StatusCode::NO_CONTENT)
}
