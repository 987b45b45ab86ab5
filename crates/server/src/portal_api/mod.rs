pub mod applications;
pub mod auth;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderName, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::cors::{AllowOrigin, CorsLayer};

use portcullis_core::{ControlError, UserRole};

use crate::api::AppState;
use crate::auth::jwt::TokenScope;
use crate::config::CorsConfig;
use crate::error::ApiError;

/// Authenticated portal caller attached to requests as an extension.
#[derive(Debug, Clone)]
pub struct PortalIdentity {
    pub user_id: String,
    pub email: String,
    pub role: UserRole,
}

/// Portal router: unauthenticated register/login plus JWT-guarded
/// application endpoints, with the configured CORS policy on top.
pub fn router(state: &AppState, cors: &CorsConfig) -> Router<AppState> {
    let protected = Router::new()
        .route(
            "/api/applications",
            get(applications::list).post(applications::create),
        )
        .route(
            "/api/applications/{id}",
            get(applications::get_one)
                .put(applications::update)
                .delete(applications::remove),
        )
        .route(
            "/api/applications/{id}/regenerate-key",
            post(applications::regenerate_key),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            portal_auth_middleware,
        ));

    let mut router = Router::new()
        .route("/api/register", post(auth::register))
        .route("/api/login", post(auth::login))
        .merge(protected);

    if cors.enabled {
        router = router.layer(cors_layer(cors));
    }
    router
}

/// Validate the portal bearer token and attach the caller identity.
async fn portal_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    let claims = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .and_then(|token| state.jwt.validate(token, TokenScope::Portal).ok());

    match claims {
        Some(claims) => {
            req.extensions_mut().insert(PortalIdentity {
                user_id: claims.sub,
                email: claims.email,
                role: claims.role,
            });
            next.run(req).await
        }
        None => ApiError(ControlError::Unauthorized).into_response(),
    }
}

/// Build the tower-http CORS layer from configuration. Preflight OPTIONS
/// requests are answered by the layer itself.
fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let wildcard = config.allowed_origins.iter().any(|o| o == "*");

    let origin = if wildcard {
        AllowOrigin::any()
    } else {
        AllowOrigin::list(
            config
                .allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    let methods: Vec<Method> = config
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();
    let headers: Vec<HeaderName> = config
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();
    let expose: Vec<HeaderName> = config
        .expose_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    let mut layer = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(methods)
        .allow_headers(headers)
        .expose_headers(expose)
        .max_age(std::time::Duration::from_secs(config.max_age_seconds));

    // Credentials cannot be combined with a wildcard origin.
    if config.allow_credentials && !wildcard {
        layer = layer.allow_credentials(true);
    }
    layer
}
