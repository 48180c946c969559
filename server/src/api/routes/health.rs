//! Health, readiness, and metrics endpoints. Unauthenticated by design.

use std::fmt::Write as _;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use utoipa::ToSchema;

use crate::api::server::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Liveness check: the process is up and serving requests.
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is alive", body = HealthResponse)
    )
)]
pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness check: the storage backend is reachable.
#[utoipa::path(
    get,
    path = "/ready",
    tag = "health",
    responses(
        (status = 200, description = "Service is ready", body = HealthResponse),
        (status = 503, description = "Storage backend unreachable", body = HealthResponse)
    )
)]
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    match state.storage.topic_exists("__readiness_probe__").await {
        Ok(_) => (
            StatusCode::OK,
            Json(HealthResponse {
                status: "ready",
                version: env!("CARGO_PKG_VERSION"),
            }),
        ),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthResponse {
                status: "storage_unavailable",
                version: env!("CARGO_PKG_VERSION"),
            }),
        ),
    }
}

/// Minimal Prometheus text-exposition of the in-process counters tracked by
/// the connection and poll managers. No metrics exporter crate: this is the
/// instrumentation surface, not the aggregation pipeline.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let conn_stats = state.connections.stats();
    let poll_stats = state.poll_manager.stats();

    let mut body = String::new();
    let _ = writeln!(
        body,
        "# HELP pulsar_relay_active_connections Number of open push-socket connections.\n\
         # TYPE pulsar_relay_active_connections gauge\n\
         pulsar_relay_active_connections {}",
        conn_stats.active_connections
    );
    let _ = writeln!(
        body,
        "# HELP pulsar_relay_dropped_sends_total Broadcast sends abandoned after the per-connection deadline.\n\
         # TYPE pulsar_relay_dropped_sends_total counter\n\
         pulsar_relay_dropped_sends_total {}",
        conn_stats.dropped_sends
    );
    let _ = writeln!(
        body,
        "# HELP pulsar_relay_active_waiters Number of long-poll requests currently waiting.\n\
         # TYPE pulsar_relay_active_waiters gauge\n\
         pulsar_relay_active_waiters {}",
        poll_stats.active_waiters
    );
    let _ = writeln!(
        body,
        "# HELP pulsar_relay_dropped_buffer_full_total Waiter deliveries dropped because a waiter's buffer was full.\n\
         # TYPE pulsar_relay_dropped_buffer_full_total counter\n\
         pulsar_relay_dropped_buffer_full_total {}",
        poll_stats.dropped_buffer_full
    );

    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4")],
        body,
    )
}
