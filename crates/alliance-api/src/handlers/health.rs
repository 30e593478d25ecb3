//! Health and status handlers
//!
//! Follows Kubernetes health check patterns:
//! - /health - comprehensive status
//! - /health/live - simple liveness (is the process running?)
//! - /health/ready - readiness (can it serve traffic?)
//!
//! /status additionally reports federation counts for dashboards.

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::dto::{failure, ApiResponse};
use crate::state::AppState;

/// Overall health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

/// Individual component health
#[derive(Debug, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub latency_ms: u64,
}

/// Comprehensive health response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: Vec<ComponentHealth>,
}

/// Simple health response for liveness/readiness probes
#[derive(Serialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

/// Federation status summary
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub providers: usize,
    pub enabled_providers: Vec<String>,
    pub registered_clients: u64,
    pub directory_users: u64,
}

/// Start time for uptime calculation
static START_TIME: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

fn get_uptime_seconds() -> u64 {
    let start = START_TIME.get_or_init(Instant::now);
    start.elapsed().as_secs()
}

/// Comprehensive health check. The directory store is the only hard
/// dependency; identity providers are probed on demand, not here.
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let store_health = check_directory_store(&state).await;
    let overall_status = store_health.status;

    let response = HealthResponse {
        status: overall_status,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: get_uptime_seconds(),
        components: vec![store_health],
    };

    let status_code = match overall_status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(response))
}

async fn check_directory_store(state: &AppState) -> ComponentHealth {
    let start = Instant::now();

    match tokio::time::timeout(Duration::from_secs(5), state.directory.count_users()).await {
        Ok(Ok(_)) => {
            debug!("Directory store health check passed");
            ComponentHealth {
                name: "directory_store".to_string(),
                status: HealthStatus::Healthy,
                message: None,
                latency_ms: start.elapsed().as_millis() as u64,
            }
        }
        Ok(Err(e)) => {
            warn!("Directory store health check failed: {}", e);
            ComponentHealth {
                name: "directory_store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some(format!("Query failed: {}", e)),
                latency_ms: start.elapsed().as_millis() as u64,
            }
        }
        Err(_) => {
            warn!("Directory store health check timed out");
            ComponentHealth {
                name: "directory_store".to_string(),
                status: HealthStatus::Unhealthy,
                message: Some("Health check timed out after 5 seconds".to_string()),
                latency_ms: 5000,
            }
        }
    }
}

/// Kubernetes liveness probe. No dependency checks, just "is the process up".
pub async fn liveness() -> (StatusCode, Json<SimpleHealthResponse>) {
    (
        StatusCode::OK,
        Json(SimpleHealthResponse {
            status: "alive".to_string(),
        }),
    )
}

/// Kubernetes readiness probe. Checks the directory store.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, Json<SimpleHealthResponse>) {
    let store_ok = matches!(
        tokio::time::timeout(Duration::from_secs(2), state.directory.count_users()).await,
        Ok(Ok(_))
    );

    if store_ok {
        (
            StatusCode::OK,
            Json(SimpleHealthResponse {
                status: "ready".to_string(),
            }),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(SimpleHealthResponse {
                status: "not ready: directory store unavailable".to_string(),
            }),
        )
    }
}

/// Federation status: provider counts, enabled provider names, client and
/// cached-user totals.
pub async fn service_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<StatusResponse>>, (StatusCode, Json<ApiResponse<()>>)> {
    let providers = state.providers.list().await.map_err(failure)?;
    let enabled_providers = providers
        .iter()
        .filter(|p| p.enabled)
        .map(|p| p.name.clone())
        .collect();
    let registered_clients = state.clients.count().await.map_err(failure)?;
    let directory_users = state.directory.count_users().await.map_err(failure)?;

    Ok(ApiResponse::ok(StatusResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        providers: providers.len(),
        enabled_providers,
        registered_clients,
        directory_users,
    }))
}
