//! Admin login and API key management.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portcullis_core::ControlError;

use crate::auth::ApiKeySummary;
use crate::error::ApiError;

use super::AppState;

/// Body of `POST /auth/login`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Body returned by `POST /auth/login`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Body of `POST /auth/api-keys`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateApiKeyRequest {
    pub name: String,
}

/// Body returned by `POST /auth/api-keys`. The key is shown exactly once.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct CreateApiKeyResponse {
    pub name: String,
    pub key: String,
}

/// Body of `GET /auth/api-keys`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiKeyListResponse {
    pub api_keys: Vec<ApiKeySummary>,
}

/// `POST /auth/login` -- exchange admin credentials for a bearer token.
#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Auth",
    summary = "Admin login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Bearer token", body = LoginResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state
        .admin_auth
        .as_ref()
        .ok_or_else(|| ControlError::Validation("admin authentication is disabled".into()))?;
    let (token, expires_at) = provider.login(&req.username, &req.password)?;
    Ok(Json(LoginResponse { token, expires_at }))
}

/// `GET /auth/api-keys` -- masked listing of admin API keys.
#[utoipa::path(
    get,
    path = "/auth/api-keys",
    tag = "Auth",
    summary = "List admin API keys (masked)",
    responses((status = 200, description = "Masked keys", body = ApiKeyListResponse))
)]
pub async fn list_api_keys(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let provider = state
        .admin_auth
        .as_ref()
        .ok_or_else(|| ControlError::Validation("admin authentication is disabled".into()))?;
    Ok(Json(ApiKeyListResponse {
        api_keys: provider.list_keys().await,
    }))
}

/// `POST /auth/api-keys` -- mint a new admin API key.
#[utoipa::path(
    post,
    path = "/auth/api-keys",
    tag = "Auth",
    summary = "Mint an admin API key",
    request_body = CreateApiKeyRequest,
    responses((status = 201, description = "The new key, shown once", body = CreateApiKeyResponse))
)]
pub async fn create_api_key(
    State(state): State<AppState>,
    Json(req): Json<CreateApiKeyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let provider = state
        .admin_auth
        .as_ref()
        .ok_or_else(|| ControlError::Validation("admin authentication is disabled".into()))?;
    let key = provider.mint_key(&req.name).await;
    Ok((
        StatusCode::CREATED,
        Json(CreateApiKeyResponse {
            name: req.name,
            key,
        }),
    ))
}
