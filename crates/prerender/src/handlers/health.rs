//! Health check endpoints for Kubernetes-style probes.
//!
//! - `/livez` - Basic liveness probe (immediate 200, no checks)
//! - `/healthz` - Render pool stats (fast, passive stats)
//! - `/readyz` - Readiness probe (active acquire + serialize check)

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use prerender_ssr::HealthStatus;

use crate::state::AppState;

/// GET /livez - Basic liveness probe.
///
/// Returns 200 immediately. Does NOT wait for the pool to warm up.
#[axum::debug_handler]
pub async fn livez() -> StatusCode {
    StatusCode::OK
}

/// GET /healthz - Render pool stats (passive stats, no render).
#[axum::debug_handler]
pub async fn healthz(State(state): State<AppState>) -> Response {
    (StatusCode::OK, Json(state.pool().stats())).into_response()
}

/// GET /readyz - Readiness probe (active health check).
///
/// Borrows a context and serializes its document. Returns 200 with health
/// status if healthy, 503 if unhealthy or the pool has not warmed up yet.
#[axum::debug_handler]
pub async fn readyz(State(state): State<AppState>) -> Response {
    match state.pool().health_check().await {
        Ok(status) if status.healthy => (StatusCode::OK, Json(status)).into_response(),
        Ok(status) => (StatusCode::SERVICE_UNAVAILABLE, Json(status)).into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthStatus {
                healthy: false,
                latency_ms: 0,
                context_id: None,
                stats: state.pool().stats(),
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}
