use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use tower::ServiceExt;

use portcullis_control::{ConfigService, ControlMetrics, Notifier, VersionManager};
use portcullis_dataplane::{DataplaneClient, MockDataplaneClient};
use portcullis_portal::MemoryPortalRepository;
use portcullis_server::api::{self, AppState};
use portcullis_server::auth::jwt::JwtManager;
use portcullis_server::config::CorsConfig;
use portcullis_store::ConfigStore;
use portcullis_store_memory::MemoryConfigStore;

// -- Helpers --------------------------------------------------------------

struct TestHarness {
    app: Router,
    mock: Arc<MockDataplaneClient>,
}

async fn harness() -> TestHarness {
    harness_with_cors(&CorsConfig::default()).await
}

async fn harness_with_cors(cors: &CorsConfig) -> TestHarness {
    let store: Arc<dyn ConfigStore> = Arc::new(MemoryConfigStore::new());
    let metrics = Arc::new(ControlMetrics::default());
    let notifier = Arc::new(
        Notifier::new(Arc::clone(&store), Arc::clone(&metrics))
            .await
            .expect("notifier should initialize"),
    );
    let service = Arc::new(ConfigService::new(store, notifier, Arc::clone(&metrics)));
    let versions = Arc::new(VersionManager::new(
        Arc::clone(&service),
        Arc::clone(&metrics),
    ));

    let mock = Arc::new(MockDataplaneClient::new());
    let state = AppState {
        service,
        versions,
        metrics,
        portal: Arc::new(MemoryPortalRepository::new()),
        dataplane: Arc::clone(&mock) as Arc<dyn DataplaneClient>,
        admin_auth: None,
        jwt: Arc::new(JwtManager::new("test-secret", "portcullis-test", 3600)),
        min_password_length: 8,
    };
    let app = api::router(state, "/api/v1", cors);
    TestHarness { app, mock }
}

async fn send(
    app: &Router,
    method: http::Method,
    uri: &str,
    body: Option<serde_json::Value>,
    bearer: Option<&str>,
) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(json) => builder
            .header(http::header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&json).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

async fn register(app: &Router, email: &str) -> String {
    let (status, json) = send(
        app,
        http::Method::POST,
        "/api/register",
        Some(serde_json::json!({
            "email": email,
            "name": "U",
            "password": "correcthorsebattery"
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["token"].as_str().unwrap().to_owned()
}

// -- Registration & login -------------------------------------------------

#[tokio::test]
async fn register_then_login() {
    let t = harness().await;
    register(&t.app, "u@example.com").await;

    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/login",
        Some(serde_json::json!({"email": "u@example.com", "password": "correcthorsebattery"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["token"].is_string());
    assert_eq!(json["user"]["email"], "u@example.com");
    assert_eq!(json["user"]["role"], "developer");
    assert!(json["user"].get("password_hash").is_none());
    assert!(json["expires_at"].is_string());
}

#[tokio::test]
async fn short_password_and_bad_email_are_rejected() {
    let t = harness().await;

    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/register",
        Some(serde_json::json!({"email": "u@example.com", "name": "U", "password": "short"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    let (status, _) = send(
        &t.app,
        http::Method::POST,
        "/api/register",
        Some(serde_json::json!({"email": "not-an-email", "name": "U", "password": "longenough"})),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn duplicate_email_conflicts() {
    let t = harness().await;
    register(&t.app, "u@example.com").await;

    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/register",
        Some(serde_json::json!({
            "email": "U@EXAMPLE.COM",
            "name": "U2",
            "password": "correcthorsebattery"
        })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn all_credential_failures_look_identical() {
    let t = harness().await;
    register(&t.app, "u@example.com").await;

    // Wrong password and unknown email must be indistinguishable.
    let (status_a, body_a) = send(
        &t.app,
        http::Method::POST,
        "/api/login",
        Some(serde_json::json!({"email": "u@example.com", "password": "wrong-password"})),
        None,
    )
    .await;
    let (status_b, body_b) = send(
        &t.app,
        http::Method::POST,
        "/api/login",
        Some(serde_json::json!({"email": "ghost@example.com", "password": "wrong-password"})),
        None,
    )
    .await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a, body_b, "credential failures must be opaque");
    assert_eq!(body_a["code"], "INVALID_CREDENTIALS");
}

// -- Applications ---------------------------------------------------------

#[tokio::test]
async fn create_application_provisions_consumer_and_key() {
    let t = harness().await;
    let token = register(&t.app, "u@example.com").await;

    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/applications",
        Some(serde_json::json!({"name": "app1"})),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let app_id = json["id"].as_str().unwrap();
    let api_key = json["api_key"].as_str().unwrap();
    assert!(json["api_secret"].is_string(), "secret shown once on create");

    // Exactly one consumer, with the application id, carrying one key.
    assert_eq!(t.mock.consumer_count(), 1);
    let consumer = t.mock.consumer(app_id).expect("consumer exists");
    assert_eq!(consumer.id, app_id);
    assert_eq!(t.mock.keys(app_id), vec![api_key.to_owned()]);
}

#[tokio::test]
async fn application_endpoints_require_a_token() {
    let t = harness().await;
    let (status, _) = send(&t.app, http::Method::GET, "/api/applications", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(
        &t.app,
        http::Method::GET,
        "/api/applications",
        None,
        Some("garbage-token"),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn ownership_is_enforced_across_users() {
    let t = harness().await;
    let token_a = register(&t.app, "a@example.com").await;
    let token_b = register(&t.app, "b@example.com").await;

    let (_, created) = send(
        &t.app,
        http::Method::POST,
        "/api/applications",
        Some(serde_json::json!({"name": "appX"})),
        Some(&token_a),
    )
    .await;
    let app_id = created["id"].as_str().unwrap();

    let (status, json) = send(
        &t.app,
        http::Method::GET,
        &format!("/api/applications/{app_id}"),
        None,
        Some(&token_b),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "ACCESS_DENIED");

    // The owner still sees it, and only their own apps are listed.
    let (status, _) = send(
        &t.app,
        http::Method::GET,
        &format!("/api/applications/{app_id}"),
        None,
        Some(&token_a),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, listing) = send(
        &t.app,
        http::Method::GET,
        "/api/applications",
        None,
        Some(&token_b),
    )
    .await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn gateway_failure_on_create_leaves_no_local_application() {
    let t = harness().await;
    let token = register(&t.app, "u@example.com").await;

    t.mock.fail_next_create();
    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/applications",
        Some(serde_json::json!({"name": "doomed"})),
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["code"], "GATEWAY_ERROR");

    // No consumer and no local row.
    assert_eq!(t.mock.consumer_count(), 0);
    let (_, listing) = send(
        &t.app,
        http::Method::GET,
        "/api/applications",
        None,
        Some(&token),
    )
    .await;
    assert_eq!(listing["total"], 0);
}

#[tokio::test]
async fn delete_tolerates_gateway_failure() {
    let t = harness().await;
    let token = register(&t.app, "u@example.com").await;

    let (_, created) = send(
        &t.app,
        http::Method::POST,
        "/api/applications",
        Some(serde_json::json!({"name": "app1"})),
        Some(&token),
    )
    .await;
    let app_id = created["id"].as_str().unwrap().to_owned();

    t.mock.fail_next_delete();
    let (status, _) = send(
        &t.app,
        http::Method::DELETE,
        &format!("/api/applications/{app_id}"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT, "local delete proceeds");

    let (status, _) = send(
        &t.app,
        http::Method::GET,
        &format!("/api/applications/{app_id}"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // The orphaned consumer is left for the drift worker.
    assert_eq!(t.mock.consumer_count(), 1);
}

#[tokio::test]
async fn regenerate_key_retains_local_rotation_on_gateway_failure() {
    let t = harness().await;
    let token = register(&t.app, "u@example.com").await;

    let (_, created) = send(
        &t.app,
        http::Method::POST,
        "/api/applications",
        Some(serde_json::json!({"name": "app1"})),
        Some(&token),
    )
    .await;
    let app_id = created["id"].as_str().unwrap().to_owned();
    let old_key = created["api_key"].as_str().unwrap().to_owned();

    t.mock.fail_next_generate();
    let (status, json) = send(
        &t.app,
        http::Method::POST,
        &format!("/api/applications/{app_id}/regenerate-key"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_key = json["api_key"].as_str().unwrap().to_owned();
    assert_ne!(new_key, old_key);

    // Local rotation landed even though the remote registration failed.
    let (_, fetched) = send(
        &t.app,
        http::Method::GET,
        &format!("/api/applications/{app_id}"),
        None,
        Some(&token),
    )
    .await;
    assert_eq!(fetched["api_key"], new_key.as_str());
}

// -- CORS -----------------------------------------------------------------

#[tokio::test]
async fn preflight_is_short_circuited_when_cors_enabled() {
    let cors = CorsConfig {
        enabled: true,
        allowed_origins: vec!["https://portal.example.com".to_owned()],
        allow_credentials: true,
        ..CorsConfig::default()
    };
    let t = harness_with_cors(&cors).await;

    let request = Request::builder()
        .method(http::Method::OPTIONS)
        .uri("/api/applications")
        .header(http::header::ORIGIN, "https://portal.example.com")
        .header(
            http::header::ACCESS_CONTROL_REQUEST_METHOD,
            http::Method::POST.as_str(),
        )
        .body(Body::empty())
        .unwrap();
    let response = t.app.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(http::header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("https://portal.example.com")
    );
    assert_eq!(
        response
            .headers()
            .get(http::header::ACCESS_CONTROL_ALLOW_CREDENTIALS)
            .and_then(|v| v.to_str().ok()),
        Some("true")
    );
}
