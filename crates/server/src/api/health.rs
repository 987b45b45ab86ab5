use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use portcullis_control::MetricsSnapshot;

use super::AppState;

/// Body of `GET /health`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of `GET /metrics`.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct MetricsResponse {
    #[serde(flatten)]
    #[schema(value_type = Object)]
    pub control: MetricsSnapshot,
    /// Next change-event sequence number the notifier will issue.
    pub notifier_next_seq: u64,
    /// Live data-plane subscribers.
    pub subscribers: usize,
}

/// `GET /health` -- liveness probe.
#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    summary = "Health check",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".into(),
        }),
    )
}

/// `GET /metrics` -- control-plane counters as JSON.
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    summary = "Control-plane metrics",
    responses((status = 200, description = "Current counters", body = MetricsResponse))
)]
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let notifier = state.service.notifier();
    let body = MetricsResponse {
        control: state.metrics.snapshot(),
        notifier_next_seq: notifier.next_seq().await,
        subscribers: notifier.subscriber_count().await,
    };
    (StatusCode::OK, Json(body))
}
