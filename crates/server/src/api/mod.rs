pub mod auth;
pub mod config;
pub mod health;
pub mod openapi;
pub mod plugins;
pub mod routes;
pub mod schemas;
pub mod upstreams;
pub mod versions;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use portcullis_control::{ConfigService, ControlMetrics, VersionManager};
use portcullis_dataplane::DataplaneClient;
use portcullis_portal::PortalRepository;

use crate::auth::AdminAuthProvider;
use crate::auth::jwt::JwtManager;
use crate::auth::middleware::AuthLayer;
use crate::config::CorsConfig;
use crate::portal_api;

use self::openapi::ApiDoc;

/// Shared application state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration mutation path.
    pub service: Arc<ConfigService>,
    /// Snapshot versioning and rollback.
    pub versions: Arc<VersionManager>,
    /// Control-plane counters served by `/metrics`.
    pub metrics: Arc<ControlMetrics>,
    /// Portal users and applications.
    pub portal: Arc<dyn PortalRepository>,
    /// Data-plane consumer/key lifecycle client.
    pub dataplane: Arc<dyn DataplaneClient>,
    /// Admin authentication; `None` disables it (development only).
    pub admin_auth: Option<Arc<AdminAuthProvider>>,
    /// Token manager shared by admin login and the portal.
    pub jwt: Arc<JwtManager>,
    /// Minimum accepted password length at portal registration.
    pub min_password_length: usize,
}

/// Build the axum router: public endpoints, the bearer-guarded admin API
/// under `api_prefix`, the portal API, and Swagger UI.
pub fn router(state: AppState, api_prefix: &str, cors: &CorsConfig) -> Router {
    let admin = Router::new()
        .route("/routes", post(routes::create).get(routes::list))
        .route(
            "/routes/{id}",
            get(routes::get_one).put(routes::update).delete(routes::remove),
        )
        .route("/upstreams", post(upstreams::create).get(upstreams::list))
        .route(
            "/upstreams/{id}",
            get(upstreams::get_one)
                .put(upstreams::update)
                .delete(upstreams::remove),
        )
        .route("/plugins", post(plugins::create).get(plugins::list))
        .route(
            "/plugins/{id}",
            get(plugins::get_one)
                .put(plugins::update)
                .delete(plugins::remove),
        )
        .route("/config", get(config::export).post(config::import))
        .route("/config/validate", post(config::validate))
        .route(
            "/config/versions",
            post(versions::create).get(versions::list),
        )
        .route("/config/versions/current", get(versions::current))
        .route("/config/versions/{id}", get(versions::get_one))
        .route("/config/versions/{id}/activate", post(versions::activate))
        .route("/config/versions/{id}/rollback", post(versions::rollback))
        .layer(AuthLayer::new(state.admin_auth.clone()));

    let public = Router::new()
        .route("/health", get(health::health))
        .route("/metrics", get(health::metrics))
        .route("/auth/login", post(auth::login))
        .route(
            "/auth/api-keys",
            get(auth::list_api_keys).post(auth::create_api_key),
        );

    Router::new()
        .merge(public)
        .nest(api_prefix, admin)
        .merge(portal_api::router(&state, cors))
        .merge(SwaggerUi::new("/docs").url("/docs/openapi.json", ApiDoc::openapi()))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
