use portcullis_core::{
    AccountStatus, Algorithm, ChangeEntry, ConfigSnapshot, ConfigVersion, HealthCheck,
    KeyValueMatch, MatchType, PathRule, Plugin, Route, RouteRules, Target, Upstream, User,
    UserRole, VersionStatus,
};

use crate::auth::ApiKeySummary;
use crate::error::ErrorEnvelope;

use super::auth::{
    ApiKeyListResponse, CreateApiKeyRequest, CreateApiKeyResponse, LoginRequest, LoginResponse,
};
use super::config::ValidateResponse;
use super::health::{HealthResponse, MetricsResponse};
use super::plugins::PluginListResponse;
use super::routes::RouteListResponse;
use super::upstreams::UpstreamListResponse;
use super::versions::{CreateVersionRequest, VersionListResponse};
use crate::portal_api::applications::{
    ApplicationListResponse, ApplicationResponse, CreateApplicationRequest,
    RegenerateKeyResponse, UpdateApplicationRequest,
};
use crate::portal_api::auth::{AuthResponse, LoginRequest as PortalLoginRequest, RegisterRequest};

#[derive(utoipa::OpenApi)]
#[openapi(
    info(
        title = "Portcullis Control Plane API",
        version = "0.1.0",
        description = "Administrative and developer-portal API for the Portcullis gateway control plane.",
        license(name = "Apache-2.0")
    ),
    tags(
        (name = "Health", description = "Service health and metrics"),
        (name = "Auth", description = "Admin login and API key management"),
        (name = "Routes", description = "Route configuration"),
        (name = "Upstreams", description = "Upstream configuration"),
        (name = "Plugins", description = "Plugin configuration"),
        (name = "Config", description = "Whole-configuration import/export"),
        (name = "Versions", description = "Versioned snapshots and rollback"),
        (name = "Portal", description = "Developer portal: registration and applications"),
    ),
    paths(
        super::health::health,
        super::health::metrics,
        super::auth::login,
        super::auth::list_api_keys,
        super::auth::create_api_key,
        super::routes::create,
        super::routes::list,
        super::routes::get_one,
        super::routes::update,
        super::routes::remove,
        super::upstreams::create,
        super::upstreams::list,
        super::upstreams::get_one,
        super::upstreams::update,
        super::upstreams::remove,
        super::plugins::create,
        super::plugins::list,
        super::plugins::get_one,
        super::plugins::update,
        super::plugins::remove,
        super::config::export,
        super::config::import,
        super::config::validate,
        super::versions::create,
        super::versions::list,
        super::versions::current,
        super::versions::get_one,
        super::versions::activate,
        super::versions::rollback,
        crate::portal_api::auth::register,
        crate::portal_api::auth::login,
        crate::portal_api::applications::create,
        crate::portal_api::applications::list,
        crate::portal_api::applications::get_one,
        crate::portal_api::applications::update,
        crate::portal_api::applications::remove,
        crate::portal_api::applications::regenerate_key,
    ),
    components(schemas(
        Route, RouteRules, PathRule, MatchType, KeyValueMatch,
        Upstream, Target, Algorithm, HealthCheck,
        Plugin,
        ConfigSnapshot, ConfigVersion, VersionStatus, ChangeEntry,
        User, UserRole, AccountStatus,
        ErrorEnvelope,
        HealthResponse, MetricsResponse,
        LoginRequest, LoginResponse,
        CreateApiKeyRequest, CreateApiKeyResponse, ApiKeyListResponse, ApiKeySummary,
        RouteListResponse, UpstreamListResponse, PluginListResponse,
        CreateVersionRequest, VersionListResponse,
        ValidateResponse,
        RegisterRequest, PortalLoginRequest, AuthResponse,
        CreateApplicationRequest, UpdateApplicationRequest, ApplicationResponse,
        ApplicationListResponse, RegenerateKeyResponse,
    ))
)]
pub struct ApiDoc;
