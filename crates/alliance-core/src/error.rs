//! Error types for the Alliance federation engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AllianceError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Provider unreachable: {message}")]
    ProviderUnreachable { message: String },

    #[error("Token exchange failed: {message}")]
    TokenExchangeFailed { message: String },

    #[error("Token verification failed: {message}")]
    TokenVerificationFailed { message: String },

    #[error("Client not found: {id}")]
    ClientNotFound { id: String },

    #[error("Provider in use: {id}")]
    ProviderInUse { id: String },

    #[error("Link conflict: {message}")]
    LinkConflict { message: String },

    #[error("Database error: {message}")]
    Database { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AllianceError {
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn provider_unreachable(message: impl Into<String>) -> Self {
        Self::ProviderUnreachable {
            message: message.into(),
        }
    }

    pub fn token_exchange_failed(message: impl Into<String>) -> Self {
        Self::TokenExchangeFailed {
            message: message.into(),
        }
    }

    pub fn token_verification_failed(message: impl Into<String>) -> Self {
        Self::TokenVerificationFailed {
            message: message.into(),
        }
    }

    pub fn link_conflict(message: impl Into<String>) -> Self {
        Self::LinkConflict {
            message: message.into(),
        }
    }

    pub fn database_error(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AllianceError>;
