//! Identity provider management handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use alliance_core::{
    Provider, ProviderConfig, ProviderId, ProviderSpec, ProviderUpdate, UserInfo,
};
use alliance_identity::ConnectionTest;

use crate::{
    dto::{failure, ApiResponse},
    handlers::users::ExternalUserDto,
    state::AppState,
};

// =============================================================================
// DTOs
// =============================================================================

/// Provider details for API responses. Secrets stay redacted.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProviderDto {
    pub id: Uuid,
    pub name: String,
    pub provider_type: String,
    pub enabled: bool,
    pub is_managed: bool,
    pub container_ref: Option<String>,
    pub config: ProviderConfig,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<Provider> for ProviderDto {
    fn from(provider: Provider) -> Self {
        Self {
            id: provider.id.into_uuid(),
            name: provider.name,
            provider_type: provider.provider_type.to_string(),
            enabled: provider.enabled,
            is_managed: provider.is_managed,
            container_ref: provider.container_ref,
            config: redact(provider.config),
            created_at: provider.created_at,
            updated_at: provider.updated_at,
        }
    }
}

/// Strip secret material before a config leaves the service
fn redact(mut config: ProviderConfig) -> ProviderConfig {
    match &mut config {
        ProviderConfig::Oidc(oidc) => {
            if !oidc.client_secret.is_empty() {
                oidc.client_secret = "[redacted]".to_string();
            }
        }
        ProviderConfig::Ldap(ldap) => {
            if !ldap.bind_password.is_empty() {
                ldap.bind_password = "[redacted]".to_string();
            }
        }
        ProviderConfig::Saml(_) => {}
    }
    config
}

/// OIDC redirect-back query parameters
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    pub state: String,
    pub code: String,
}

/// Outcome of a completed login flow
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub identity: UserInfo,
    pub user: ExternalUserDto,
}

// =============================================================================
// Handlers
// =============================================================================

/// List all configured providers
#[instrument(skip(state))]
pub async fn list_providers(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<ProviderDto>>>, (StatusCode, Json<ApiResponse<()>>)> {
    let providers = state.providers.list().await.map_err(failure)?;
    Ok(ApiResponse::ok(
        providers.into_iter().map(ProviderDto::from).collect(),
    ))
}

/// Register a new provider
#[instrument(skip(state, spec), fields(name = %spec.name))]
pub async fn create_provider(
    State(state): State<AppState>,
    Json(spec): Json<ProviderSpec>,
) -> Result<Json<ApiResponse<ProviderDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    let provider = state.providers.create(spec).await.map_err(failure)?;
    info!(provider_id = %provider.id, "Provider created via API");
    Ok(ApiResponse::ok(provider.into()))
}

/// Get a specific provider by ID
#[instrument(skip(state))]
pub async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ProviderDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    let provider = state
        .providers
        .get(ProviderId::from_uuid(id))
        .await
        .map_err(failure)?;
    Ok(ApiResponse::ok(provider.into()))
}

/// Apply a partial update to a provider
#[instrument(skip(state, update))]
pub async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(update): Json<ProviderUpdate>,
) -> Result<Json<ApiResponse<ProviderDto>>, (StatusCode, Json<ApiResponse<()>>)> {
    let provider = state
        .providers
        .update(ProviderId::from_uuid(id), update)
        .await
        .map_err(failure)?;
    Ok(ApiResponse::ok(provider.into()))
}

/// Delete a provider and its cached directory entries
#[instrument(skip(state))]
pub async fn delete_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<()>>, (StatusCode, Json<ApiResponse<()>>)> {
    state
        .providers
        .delete(ProviderId::from_uuid(id))
        .await
        .map_err(failure)?;
    Ok(ApiResponse::ok(()))
}

/// Probe provider connectivity without touching persisted state
#[instrument(skip(state))]
pub async fn test_provider(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<ConnectionTest>>, (StatusCode, Json<ApiResponse<()>>)> {
    let outcome = state
        .providers
        .test_connection(ProviderId::from_uuid(id))
        .await
        .map_err(failure)?;
    Ok(ApiResponse::ok(outcome))
}

/// OIDC redirect target. Consumes the state token, exchanges the code,
/// validates the ID token, and upserts the directory entry for the login.
#[instrument(skip(state, params), fields(provider_id = %id))]
pub async fn oidc_callback(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(params): Query<CallbackParams>,
) -> Result<Json<ApiResponse<LoginResponse>>, (StatusCode, Json<ApiResponse<()>>)> {
    let provider_id = ProviderId::from_uuid(id);

    // Hold the flow guard across the exchange so the provider cannot be
    // deleted out from under an in-progress login.
    let _guard = state.providers.begin_flow(provider_id);

    let client = state.providers.oidc_client(provider_id).await.map_err(failure)?;
    let identity = client
        .authenticate_callback(&params.state, &params.code)
        .await
        .map_err(failure)?;

    debug!(subject = %identity.subject, "Login callback verified");
    let user = state
        .engine
        .upsert_login(provider_id, &identity)
        .await
        .map_err(failure)?;

    Ok(ApiResponse::ok(LoginResponse {
        identity,
        user: user.into(),
    }))
}
