//! Health check endpoint handlers.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::app::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backend: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<DatabaseHealth>,
    pub roster: RosterHealth,
    pub kiosk_sessions: usize,
    pub feed_subscribers: usize,
}

/// Database health status.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseHealth {
    pub connected: bool,
    pub latency_ms: Option<u64>,
}

/// Cached roster as served to dashboards.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct RosterHealth {
    pub version: u64,
    pub total: usize,
}

/// Simple status response for liveness/readiness probes.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

async fn database_health(state: &AppState) -> Option<DatabaseHealth> {
    let pool = state.pool.as_ref()?;
    let start = std::time::Instant::now();
    let connected = persistence::db::ping(pool).await.is_ok();
    let latency_ms = start.elapsed().as_millis() as u64;
    Some(DatabaseHealth {
        connected,
        latency_ms: connected.then_some(latency_ms),
    })
}

/// Full health check endpoint.
///
/// Reports database connectivity (Postgres backend only) along with the
/// snapshot version and open kiosk sessions.
pub async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let database = database_health(&state).await;
    let healthy = database.as_ref().map_or(true, |db| db.connected);
    let stats = state.snapshot.stats();

    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: state.config.database.backend.as_str(),
        database,
        roster: RosterHealth {
            version: state.snapshot.version(),
            total: stats.total,
        },
        kiosk_sessions: state.kiosks.len(),
        feed_subscribers: state.feed.subscriber_count(),
    };

    if healthy {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

/// Liveness probe endpoint.
///
/// Returns 200 OK if the process is running.
pub async fn live() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "alive".to_string(),
    })
}

/// Readiness probe endpoint.
///
/// Returns 200 OK if the service can accept traffic (storage reachable).
pub async fn ready(State(state): State<AppState>) -> Result<Json<StatusResponse>, StatusCode> {
    let connected = database_health(&state)
        .await
        .map_or(true, |db| db.connected);

    if connected {
        Ok(Json(StatusResponse {
            status: "ready".to_string(),
        }))
    } else {
        Err(StatusCode::SERVICE_UNAVAILABLE)
    }
}
