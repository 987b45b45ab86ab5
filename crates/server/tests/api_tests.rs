use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use tower::ServiceExt;

use portcullis_control::{
    ChangeKind, ConfigService, ControlMetrics, Notification, Notifier, VersionManager,
};
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
    state: AppState,
}

async fn harness() -> TestHarness {
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

    let state = AppState {
        service,
        versions,
        metrics,
        portal: Arc::new(MemoryPortalRepository::new()),
        dataplane: Arc::new(MockDataplaneClient::new()) as Arc<dyn DataplaneClient>,
        admin_auth: None,
        jwt: Arc::new(JwtManager::new("test-secret", "portcullis-test", 3600)),
        min_password_length: 8,
    };
    let app = api::router(state.clone(), "/api/v1", &CorsConfig::default());
    TestHarness { app, state }
}

async fn send(
    app: &Router,
    method: http::Method,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = Request::builder().method(method).uri(uri);
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

fn upstream_body(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": format!("upstream-{id}"),
        "targets": [{"url": "http://10.0.0.1:8080", "weight": 1}],
        "algorithm": "round_robin"
    })
}

fn route_body(upstream_id: &str) -> serde_json::Value {
    serde_json::json!({
        "name": "r1",
        "rules": {
            "hosts": ["a.example"],
            "paths": [{"type": "prefix", "value": "/api"}],
            "methods": ["GET"]
        },
        "upstream_id": upstream_id,
        "priority": 100
    })
}

// -- Health & docs --------------------------------------------------------

#[tokio::test]
async fn health_and_metrics_are_public() {
    let t = harness().await;

    let (status, json) = send(&t.app, http::Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");

    let (status, json) = send(&t.app, http::Method::GET, "/metrics", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["mutations"].is_u64());
}

// -- Route CRUD -----------------------------------------------------------

#[tokio::test]
async fn create_route_happy_path() {
    let t = harness().await;
    let (status, _) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let mut sub = t.state.service.notifier().subscribe(None).await;

    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/routes",
        Some(route_body("u1")),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let id = json["id"].as_str().expect("server-assigned id");
    assert!(!id.is_empty());
    assert!(json["created_at"].is_string());
    assert!(json["updated_at"].is_string());

    match sub.recv().await.unwrap() {
        Notification::Event(event) => {
            assert_eq!(event.kind, ChangeKind::Create);
            assert_eq!(event.key, format!("routes/{id}"));
        }
        other => panic!("expected create event, got {other:?}"),
    }
}

#[tokio::test]
async fn dangling_upstream_returns_400_without_side_effects() {
    let t = harness().await;
    let mut sub = t.state.service.notifier().subscribe(None).await;

    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/routes",
        Some(route_body("nope")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");

    // No store write.
    let (_, listing) = send(&t.app, http::Method::GET, "/api/v1/routes", None).await;
    assert_eq!(listing["total"], 0);

    // No event.
    let nothing =
        tokio::time::timeout(std::time::Duration::from_millis(100), sub.recv()).await;
    assert!(nothing.is_err());
}

#[tokio::test]
async fn unknown_id_is_404_and_conflict_is_409() {
    let t = harness().await;

    let (status, json) = send(&t.app, http::Method::GET, "/api/v1/routes/ghost", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;
    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["code"], "CONFLICT");
}

#[tokio::test]
async fn unsupported_method_is_405() {
    let t = harness().await;
    let (status, _) = send(&t.app, http::Method::PATCH, "/api/v1/routes", None).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn list_clamps_limit_and_preserves_total_past_the_end() {
    let t = harness().await;
    for i in 0..5 {
        send(
            &t.app,
            http::Method::POST,
            "/api/v1/upstreams",
            Some(upstream_body(&format!("u{i}"))),
        )
        .await;
    }

    let (_, json) = send(
        &t.app,
        http::Method::GET,
        "/api/v1/upstreams?limit=2&offset=0",
        None,
    )
    .await;
    assert_eq!(json["upstreams"].as_array().unwrap().len(), 2);
    assert_eq!(json["total"], 5);

    let (_, json) = send(
        &t.app,
        http::Method::GET,
        "/api/v1/upstreams?limit=99999",
        None,
    )
    .await;
    assert_eq!(json["limit"], 100);

    let (_, json) = send(
        &t.app,
        http::Method::GET,
        "/api/v1/upstreams?offset=50",
        None,
    )
    .await;
    assert!(json["upstreams"].as_array().unwrap().is_empty());
    assert_eq!(json["total"], 5);
}

#[tokio::test]
async fn referenced_upstream_cannot_be_deleted() {
    let t = harness().await;
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/routes",
        Some(route_body("u1")),
    )
    .await;

    let (status, json) = send(&t.app, http::Method::DELETE, "/api/v1/upstreams/u1", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "VALIDATION_ERROR");
}

// -- Watch ordering -------------------------------------------------------

#[tokio::test]
async fn subscriber_sees_crud_in_order_with_increasing_seq() {
    let t = harness().await;
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;

    let mut sub = t.state.service.notifier().subscribe(None).await;

    let (_, created) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/routes",
        Some(route_body("u1")),
    )
    .await;
    let id = created["id"].as_str().unwrap().to_owned();

    let mut updated = route_body("u1");
    updated["priority"] = serde_json::json!(200);
    send(
        &t.app,
        http::Method::PUT,
        &format!("/api/v1/routes/{id}"),
        Some(updated),
    )
    .await;
    send(
        &t.app,
        http::Method::DELETE,
        &format!("/api/v1/routes/{id}"),
        None,
    )
    .await;

    let mut last_seq = 0;
    for expected in [ChangeKind::Create, ChangeKind::Update, ChangeKind::Delete] {
        match sub.recv().await.unwrap() {
            Notification::Event(event) => {
                assert_eq!(event.kind, expected);
                assert!(event.seq > last_seq, "seq must be strictly increasing");
                last_seq = event.seq;
            }
            other => panic!("expected event, got {other:?}"),
        }
    }

    // A subscriber started after the deletion sees none of the above.
    let mut fresh = t.state.service.notifier().subscribe(None).await;
    let nothing =
        tokio::time::timeout(std::time::Duration::from_millis(100), fresh.recv()).await;
    assert!(nothing.is_err());
}

// -- Versioning -----------------------------------------------------------

#[tokio::test]
async fn rollback_restores_earlier_snapshot() {
    let t = harness().await;

    // S1: one upstream, no routes.
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;
    let (_, v1) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/config/versions",
        Some(serde_json::json!({"description": "S1"})),
    )
    .await;
    let v1_id = v1["id"].as_str().unwrap().to_owned();
    send(
        &t.app,
        http::Method::POST,
        &format!("/api/v1/config/versions/{v1_id}/activate"),
        None,
    )
    .await;

    // S2: add a route.
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/routes",
        Some(route_body("u1")),
    )
    .await;
    let (_, v2) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/config/versions",
        Some(serde_json::json!({"description": "S2"})),
    )
    .await;
    let v2_id = v2["id"].as_str().unwrap().to_owned();
    send(
        &t.app,
        http::Method::POST,
        &format!("/api/v1/config/versions/{v2_id}/activate"),
        None,
    )
    .await;

    // Roll back to S1.
    let (status, v3) = send(
        &t.app,
        http::Method::POST,
        &format!("/api/v1/config/versions/{v1_id}/rollback"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v3["status"], "active");
    assert_eq!(v3["metadata"]["rollback_to"], v1_id.as_str());
    assert_eq!(v3["metadata"]["rollback_from"], v2_id.as_str());

    let (_, v2_after) = send(
        &t.app,
        http::Method::GET,
        &format!("/api/v1/config/versions/{v2_id}"),
        None,
    )
    .await;
    assert_eq!(v2_after["status"], "rolled_back");

    // Live routes equal S1.
    let (_, routes) = send(&t.app, http::Method::GET, "/api/v1/routes", None).await;
    assert_eq!(routes["total"], 0);

    let (_, current) = send(
        &t.app,
        http::Method::GET,
        "/api/v1/config/versions/current",
        None,
    )
    .await;
    assert_eq!(current["id"], v3["id"]);
}

#[tokio::test]
async fn rollback_to_unknown_version_is_404_and_keeps_active() {
    let t = harness().await;
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;
    let (_, v1) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/config/versions",
        Some(serde_json::json!({"description": "S1"})),
    )
    .await;
    let v1_id = v1["id"].as_str().unwrap().to_owned();
    send(
        &t.app,
        http::Method::POST,
        &format!("/api/v1/config/versions/{v1_id}/activate"),
        None,
    )
    .await;

    let (status, json) = send(
        &t.app,
        http::Method::POST,
        "/api/v1/config/versions/ghost/rollback",
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "NOT_FOUND");

    let (_, current) = send(
        &t.app,
        http::Method::GET,
        "/api/v1/config/versions/current",
        None,
    )
    .await;
    assert_eq!(current["id"], v1_id.as_str());
}

// -- YAML import/export ---------------------------------------------------

#[tokio::test]
async fn config_export_import_round_trip() {
    let t = harness().await;
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/upstreams",
        Some(upstream_body("u1")),
    )
    .await;
    send(
        &t.app,
        http::Method::POST,
        "/api/v1/routes",
        Some(route_body("u1")),
    )
    .await;

    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/v1/config")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let yaml = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    // Validate endpoint accepts the exported document.
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/config/validate")
                .header(http::header::CONTENT_TYPE, "application/yaml")
                .body(Body::from(yaml.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    let verdict = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let verdict: serde_json::Value = serde_json::from_slice(&verdict).unwrap();
    assert_eq!(verdict["valid"], true);

    // Import activates a new version carrying the same entities.
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method(http::Method::POST)
                .uri("/api/v1/config")
                .header(http::header::CONTENT_TYPE, "application/yaml")
                .body(Body::from(yaml))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let (_, routes) = send(&t.app, http::Method::GET, "/api/v1/routes", None).await;
    assert_eq!(routes["total"], 1);
}
