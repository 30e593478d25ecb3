//! Response envelope and error mapping shared by all handlers

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use alliance_core::AllianceError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, String>>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

/// Map a domain error onto the wire: status code plus a stable error code.
pub fn failure(err: AllianceError) -> (StatusCode, Json<ApiResponse<()>>) {
    let (status, code) = match &err {
        AllianceError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        AllianceError::ClientNotFound { .. } => (StatusCode::NOT_FOUND, "CLIENT_NOT_FOUND"),
        AllianceError::InvalidConfig { .. } => (StatusCode::BAD_REQUEST, "INVALID_CONFIG"),
        AllianceError::ProviderInUse { .. } => (StatusCode::CONFLICT, "PROVIDER_IN_USE"),
        AllianceError::LinkConflict { .. } => (StatusCode::CONFLICT, "LINK_CONFLICT"),
        AllianceError::ProviderUnreachable { .. } => {
            (StatusCode::BAD_GATEWAY, "PROVIDER_UNREACHABLE")
        }
        AllianceError::TokenExchangeFailed { .. } => {
            (StatusCode::UNAUTHORIZED, "TOKEN_EXCHANGE_FAILED")
        }
        AllianceError::TokenVerificationFailed { .. } => {
            (StatusCode::UNAUTHORIZED, "TOKEN_VERIFICATION_FAILED")
        }
        AllianceError::Database { .. } | AllianceError::Internal { .. } => {
            (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
        }
    };

    (
        status,
        Json(ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.to_string(),
                message: err.to_string(),
                details: None,
            }),
        }),
    )
}
