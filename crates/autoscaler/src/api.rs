//! HTTP API: metrics queries, health checks and Prometheus exposition

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use scaler_lib::{
    health::HealthRegistry,
    metrics::MetricsQueryService,
    observability::ScalerMetrics,
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ScalerMetrics,
    pub query: Arc<MetricsQueryService>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ScalerMetrics,
        query: Arc<MetricsQueryService>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            query,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

fn bad_request(message: &str) -> (StatusCode, Json<ErrorBody>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
}

/// Missing, unparsable and zero timestamps are all rejected
fn timestamp_param(params: &HashMap<String, String>, key: &str) -> Option<i64> {
    params
        .get(key)
        .and_then(|v| v.trim().parse::<i64>().ok())
        .filter(|ts| *ts != 0)
}

/// `GET /metrics?resourceName=&startTimestamp=&endTimestamp=`
async fn query_metrics(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let resource_name = match params.get("resourceName").map(|v| v.trim()) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => return bad_request("Invalid resource name").into_response(),
    };
    let Some(start) = timestamp_param(&params, "startTimestamp") else {
        return bad_request("Invalid start timestamp").into_response();
    };
    let Some(end) = timestamp_param(&params, "endTimestamp") else {
        return bad_request("Invalid end timestamp").into_response();
    };

    match state.query.query(&resource_name, start, end).await {
        Ok(points) => (StatusCode::OK, Json(json!({ "metrics": points }))).into_response(),
        Err(e) => {
            warn!(resource = %resource_name, error = %e, "metrics query failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorBody {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn hello() -> &'static str {
    "Hello World! I'm a HTTP server!"
}

/// 200 when healthy or degraded, 503 when a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn prometheus_metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            e.to_string().into_bytes(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/metrics", get(query_metrics))
        .route("/hello", get(hello))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/prometheus", get(prometheus_metrics))
        .with_state(state)
}

/// Serve until `shutdown` resolves
pub async fn serve(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
