//! Portal registration and login.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portcullis_core::{AccountStatus, ControlError, User, UserRole};
use portcullis_portal::PortalError;

use crate::api::AppState;
use crate::auth::jwt::TokenScope;
use crate::auth::password;
use crate::error::ApiError;

/// Body of `POST /api/register`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Body of `POST /api/login`.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[schema(as = PortalLoginRequest)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Token response shared by register and login.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
    pub expires_at: DateTime<Utc>,
}

/// `POST /api/register` -- create a portal account and issue a token.
#[utoipa::path(
    post,
    path = "/api/register",
    tag = "Portal",
    summary = "Register a portal account",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Invalid email or password"),
        (status = 409, description = "Email already registered"),
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    User::validate_email(&req.email)?;
    if req.password.len() < state.min_password_length {
        return Err(ControlError::Validation(format!(
            "password must be at least {} characters",
            state.min_password_length
        ))
        .into());
    }
    if req.name.trim().is_empty() {
        return Err(ControlError::Validation("name is required".into()).into());
    }

    let now = Utc::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: req.email.to_lowercase(),
        name: req.name,
        password_hash: password::hash_password(&req.password)?,
        role: UserRole::Developer,
        status: AccountStatus::Active,
        created_at: now,
        updated_at: now,
    };
    state
        .portal
        .users()
        .create(&user)
        .await
        .map_err(ControlError::from)?;

    let (token, expires_at) =
        state
            .jwt
            .issue(&user.id, &user.email, user.role, TokenScope::Portal)?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            token,
            user,
            expires_at,
        }),
    ))
}

/// `POST /api/login` -- authenticate and issue a token.
///
/// Every credential failure (unknown email, wrong password, non-active
/// account) returns the same opaque 401.
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "Portal",
    summary = "Portal login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Bearer token", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = match state.portal.users().get_by_email(&req.email).await {
        Ok(user) => user,
        Err(PortalError::NotFound(_)) => return Err(ControlError::Unauthorized.into()),
        Err(e) => return Err(ControlError::from(e).into()),
    };

    if user.status != AccountStatus::Active {
        return Err(ControlError::Unauthorized.into());
    }
    if !password::verify_password(&user.password_hash, &req.password) {
        return Err(ControlError::Unauthorized.into());
    }

    let (token, expires_at) =
        state
            .jwt
            .issue(&user.id, &user.email, user.role, TokenScope::Portal)?;
    Ok(Json(AuthResponse {
        token,
        user,
        expires_at,
    }))
}
