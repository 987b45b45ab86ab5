//! Portal application CRUD.
//!
//! Every application write pairs the repository with a data-plane consumer
//! call. The policy is compensating, not transactional: a failed local
//! write reverses the remote side before returning, a failed remote delete
//! is tolerated (the drift worker cleans up), and a failed remote key
//! rotation keeps the local rotation and lets the drift worker converge.

use axum::Extension;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use portcullis_control::ControlMetrics;
use portcullis_core::{AccountStatus, Application, ControlError};
use portcullis_dataplane::Consumer;
use portcullis_portal::{ApplicationFilter, PageRequest};

use crate::api::AppState;
use crate::error::ApiError;

use super::PortalIdentity;

/// Body of `POST /api/applications`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateApplicationRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Requests per minute; 0 means unlimited.
    #[serde(default)]
    pub rate_limit: i64,
}

/// Body of `PUT /api/applications/{id}`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateApplicationRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub rate_limit: Option<i64>,
    #[serde(default)]
    pub status: Option<AccountStatus>,
}

/// Wire view of an application. The secret appears exactly once, in the
/// creation response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApplicationResponse {
    pub id: String,
    pub name: String,
    pub description: String,
    pub user_id: String,
    pub api_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    pub status: AccountStatus,
    pub rate_limit: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Body of `GET /api/applications`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApplicationListResponse {
    pub applications: Vec<ApplicationResponse>,
    pub total: u64,
    pub limit: u64,
    pub offset: u64,
}

/// Body of `POST /api/applications/{id}/regenerate-key`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RegenerateKeyResponse {
    pub api_key: String,
}

/// Pagination query for application listings.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct ListApplicationsParams {
    #[serde(default)]
    pub limit: u64,
    #[serde(default)]
    pub offset: u64,
}

fn to_response(app: Application, with_secret: bool) -> ApplicationResponse {
    ApplicationResponse {
        id: app.id,
        name: app.name,
        description: app.description,
        user_id: app.user_id,
        api_key: app.api_key,
        api_secret: with_secret.then_some(app.api_secret),
        status: app.status,
        rate_limit: app.rate_limit,
        created_at: app.created_at,
        updated_at: app.updated_at,
    }
}

fn new_api_key() -> String {
    format!("ak_{}", uuid::Uuid::new_v4().simple())
}

/// Load an application and enforce that the caller owns it.
async fn load_owned(
    state: &AppState,
    identity: &PortalIdentity,
    id: &str,
) -> Result<Application, ControlError> {
    let app = state
        .portal
        .applications()
        .get(id)
        .await
        .map_err(ControlError::from)?;
    if app.user_id != identity.user_id {
        return Err(ControlError::Permission(
            "application belongs to another user".into(),
        ));
    }
    Ok(app)
}

/// `POST /api/applications` -- create an application and its data-plane
/// consumer.
#[utoipa::path(
    post,
    path = "/api/applications",
    tag = "Portal",
    summary = "Create an application",
    request_body = CreateApplicationRequest,
    responses(
        (status = 201, description = "Application created", body = ApplicationResponse),
        (status = 400, description = "Validation error"),
        (status = 502, description = "Data-plane provisioning failed"),
    )
)]
pub async fn create(
    State(state): State<AppState>,
    Extension(identity): Extension<PortalIdentity>,
    Json(req): Json<CreateApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = Utc::now();
    let app = Application {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name,
        description: req.description,
        user_id: identity.user_id.clone(),
        api_key: new_api_key(),
        api_secret: format!("sk_{}", uuid::Uuid::new_v4().simple()),
        status: AccountStatus::Active,
        rate_limit: req.rate_limit,
        created_at: now,
        updated_at: now,
    };
    app.validate()?;

    // Provision the consumer first; a gateway failure means no local write.
    let consumer = Consumer {
        id: app.id.clone(),
        username: app.name.clone(),
    };
    state
        .dataplane
        .create_consumer(&consumer)
        .await
        .map_err(ControlError::from)?;
    if let Err(e) = state.dataplane.generate_api_key(&app.id, &app.api_key).await {
        // Half-provisioned consumer: reverse it before reporting failure.
        if let Err(cleanup) = state.dataplane.delete_consumer(&app.id).await {
            warn!(app = %app.id, error = %cleanup, "consumer cleanup failed after key error");
        }
        return Err(ControlError::from(e).into());
    }

    if let Err(e) = state.portal.applications().create(&app).await {
        // Compensate: the consumer must not outlive the failed write.
        if let Err(cleanup) = state.dataplane.delete_consumer(&app.id).await {
            warn!(app = %app.id, error = %cleanup, "consumer cleanup failed after repo error");
        }
        return Err(ControlError::from(e).into());
    }

    Ok((StatusCode::CREATED, Json(to_response(app, true))))
}

/// `GET /api/applications` -- list the caller's applications.
#[utoipa::path(
    get,
    path = "/api/applications",
    tag = "Portal",
    summary = "List my applications",
    params(ListApplicationsParams),
    responses((status = 200, description = "Application page", body = ApplicationListResponse))
)]
pub async fn list(
    State(state): State<AppState>,
    Extension(identity): Extension<PortalIdentity>,
    Query(params): Query<ListApplicationsParams>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .portal
        .applications()
        .list(
            &ApplicationFilter {
                user_id: Some(identity.user_id.clone()),
                status: None,
            },
            &PageRequest {
                offset: params.offset,
                limit: params.limit,
                ..PageRequest::default()
            },
        )
        .await
        .map_err(ControlError::from)?;

    Ok(Json(ApplicationListResponse {
        applications: page
            .items
            .into_iter()
            .map(|app| to_response(app, false))
            .collect(),
        total: page.total,
        limit: page.limit,
        offset: page.offset,
    }))
}

/// `GET /api/applications/{id}` -- fetch one of the caller's applications.
#[utoipa::path(
    get,
    path = "/api/applications/{id}",
    tag = "Portal",
    summary = "Get an application",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "The application", body = ApplicationResponse),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn get_one(
    State(state): State<AppState>,
    Extension(identity): Extension<PortalIdentity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app = load_owned(&state, &identity, &id).await?;
    Ok(Json(to_response(app, false)))
}

/// `PUT /api/applications/{id}` -- update mutable fields.
#[utoipa::path(
    put,
    path = "/api/applications/{id}",
    tag = "Portal",
    summary = "Update an application",
    params(("id" = String, Path, description = "Application id")),
    request_body = UpdateApplicationRequest,
    responses(
        (status = 200, description = "Updated application", body = ApplicationResponse),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn update(
    State(state): State<AppState>,
    Extension(identity): Extension<PortalIdentity>,
    Path(id): Path<String>,
    Json(req): Json<UpdateApplicationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let mut app = load_owned(&state, &identity, &id).await?;

    if let Some(name) = req.name {
        app.name = name;
    }
    if let Some(description) = req.description {
        app.description = description;
    }
    if let Some(rate_limit) = req.rate_limit {
        app.rate_limit = rate_limit;
    }
    if let Some(status) = req.status {
        app.status = status;
    }
    app.updated_at = Utc::now();
    app.validate()?;

    state
        .portal
        .applications()
        .update(&app)
        .await
        .map_err(ControlError::from)?;
    Ok(Json(to_response(app, false)))
}

/// `DELETE /api/applications/{id}` -- delete an application.
///
/// The consumer is removed first; a gateway failure is logged and local
/// deletion proceeds anyway (the drift worker removes the orphan later).
#[utoipa::path(
    delete,
    path = "/api/applications/{id}",
    tag = "Portal",
    summary = "Delete an application",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 204, description = "Application deleted"),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn remove(
    State(state): State<AppState>,
    Extension(identity): Extension<PortalIdentity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let app = load_owned(&state, &identity, &id).await?;

    if let Err(e) = state.dataplane.delete_consumer(&app.id).await {
        ControlMetrics::incr(&state.metrics.drift_detected);
        warn!(app = %app.id, error = %e, "consumer removal failed; proceeding with local delete");
    }

    state
        .portal
        .applications()
        .delete(&app.id)
        .await
        .map_err(ControlError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /api/applications/{id}/regenerate-key` -- rotate the API key.
///
/// The local rotation always lands; the remote side is best-effort and the
/// drift worker repairs any mismatch.
#[utoipa::path(
    post,
    path = "/api/applications/{id}/regenerate-key",
    tag = "Portal",
    summary = "Regenerate an application API key",
    params(("id" = String, Path, description = "Application id")),
    responses(
        (status = 200, description = "The new key", body = RegenerateKeyResponse),
        (status = 403, description = "Owned by another user"),
        (status = 404, description = "Unknown id"),
    )
)]
pub async fn regenerate_key(
    State(state): State<AppState>,
    Extension(identity): Extension<PortalIdentity>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let mut app = load_owned(&state, &identity, &id).await?;
    let old_key = app.api_key.clone();
    app.api_key = new_api_key();
    app.updated_at = Utc::now();

    state
        .portal
        .applications()
        .update(&app)
        .await
        .map_err(ControlError::from)?;

    // Best-effort remote rotation.
    if let Err(e) = state.dataplane.revoke_api_key(&app.id, &old_key).await {
        ControlMetrics::incr(&state.metrics.drift_detected);
        warn!(app = %app.id, error = %e, "old key revocation failed; drift worker will converge");
    }
    if let Err(e) = state.dataplane.generate_api_key(&app.id, &app.api_key).await {
        ControlMetrics::incr(&state.metrics.drift_detected);
        warn!(app = %app.id, error = %e, "new key registration failed; drift worker will converge");
    }

    Ok(Json(RegenerateKeyResponse {
        api_key: app.api_key,
    }))
}
