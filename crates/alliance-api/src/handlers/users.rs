//! Directory user handlers: listing, account linking, and sync triggers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use alliance_core::{ExternalUser, ExternalUserId, LocalUserId, ProviderId, SyncResult};

use crate::{
    dto::{failure, ApiResponse},
    state::AppState,
};

// =============================================================================
// DTOs
// =============================================================================

/// Cached directory user for API responses
#[derive(Debug, Serialize, Deserialize)]
pub struct ExternalUserDto {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub groups: Vec<String>,
    pub local_user_ref: Option<Uuid>,
    pub last_sync: chrono::DateTime<chrono::Utc>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ExternalUser> for ExternalUserDto {
    fn from(user: ExternalUser) -> Self {
        Self {
            id: user.id.into_uuid(),
            provider_id: user.provider_id.into_uuid(),
            external_id: user.external_id,
            username: user.username,
            email: user.email,
            display_name: user.display_name,
            groups: user.groups,
            local_user_ref: user.local_user_ref.map(|r| r.into_uuid()),
            last_sync: user.last_sync,
            created_at: user.created_at,
        }
    }
}

/// Request to bind an external user to a local account
#[derive(Debug, Deserialize)]
pub struct LinkUserRequest {
    pub local_user_ref: Uuid,
}

/// Request to reconcile a provider's directory
#[derive(Debug, Deserialize)]
pub struct TriggerSyncRequest {
    pub provider_id: Uuid,
    #[serde(default)]
    pub full_sync: bool,
}

/// Reconciliation outcome for API responses
#[derive(Debug, Serialize)]
pub struct SyncResultDto {
    pub provider_id: Uuid,
    pub added: u32,
    pub updated: u32,
    pub removed: u32,
    pub errors: Vec<SyncErrorDto>,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub completed_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Serialize)]
pub struct SyncErrorDto {
    pub entity_type: String,
    pub external_id: Option<String>,
    pub message: String,
}

impl From<SyncResult> for SyncResultDto {
    fn from(result: SyncResult) -> Self {
        Self {
            provider_id: result.provider_id.into_uuid(),
            added: result.added,
            updated: result.updated,
            removed: result.removed,
            errors: result
                .errors
                .into_iter()
                .map(|e| SyncErrorDto {
                    entity_type: e.entity_type,
                    external_id: e.external_id,
                    message: e.message,
                })
                .collect(),
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// List all cached directory users across providers
#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ExternalUserDto>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let users = state.directory.list_all_users().await.map_err(failure)?;
    Ok(ApiResponse::ok(
        users.into_iter().map(ExternalUserDto::from).collect(),
    ))
}

/// Bind a cached external user to a local account
#[instrument(skip(state, request))]
pub async fn link_user(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<LinkUserRequest>,
) -> Result<Json<ApiResponse<ExternalUserDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    let user = state
        .engine
        .link_user(
            ExternalUserId::from_uuid(id),
            LocalUserId::from_uuid(request.local_user_ref),
        )
        .await
        .map_err(failure)?;
    info!(external_id = %user.external_id, "User linked to local account");
    Ok(ApiResponse::ok(user.into()))
}

/// Reconcile a provider's directory with the cache
#[instrument(skip(state, request), fields(provider_id = %request.provider_id, full_sync = request.full_sync))]
pub async fn trigger_sync(
    State(state): State<AppState>,
    Json(request): Json<TriggerSyncRequest>,
) -> Result<Json<ApiResponse<SyncResultDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    let result = state
        .engine
        .sync(ProviderId::from_uuid(request.provider_id), request.full_sync)
        .await
        .map_err(failure)?;
    Ok(ApiResponse::ok(result.into()))
}
