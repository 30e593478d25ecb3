//! Relying-party clients and the tiered SSO capability model

use crate::{
    error::{AllianceError, Result},
    ids::{ClientId, ProviderId},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordinal SSO integration depth.
///
/// Selection always prefers the numerically highest tier both the provider
/// type and the application's compatibility profile support.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SsoTier {
    /// Proxy-level allow/deny; no identity reaches the application
    ForwardAuth,
    /// Trusted identity headers injected into the request path
    Headers,
    /// The application performs its own OIDC handshake via a registered client
    Oidc,
    /// The application binds directly to the provider's LDAP interface
    Ldap,
}

impl SsoTier {
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::ForwardAuth => 1,
            Self::Headers => 2,
            Self::Oidc => 3,
            Self::Ldap => 4,
        }
    }

    pub fn from_u8(n: u8) -> Result<Self> {
        match n {
            1 => Ok(Self::ForwardAuth),
            2 => Ok(Self::Headers),
            3 => Ok(Self::Oidc),
            4 => Ok(Self::Ldap),
            other => Err(AllianceError::invalid_config(format!(
                "Unknown SSO tier: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SsoTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ForwardAuth => write!(f, "forward_auth"),
            Self::Headers => write!(f, "headers"),
            Self::Oidc => write!(f, "oidc"),
            Self::Ldap => write!(f, "ldap"),
        }
    }
}

/// An application registered as a relying party against exactly one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    /// Owning provider; a client is never active against a disabled provider
    pub provider_id: ProviderId,
    /// Opaque reference to the backing workload, if any
    pub container_ref: Option<String>,
    pub app_name: String,
    /// OAuth client id handed to the application
    pub client_id: String,
    /// Client secret, base64 nonce+ciphertext at rest
    pub client_secret_enc: String,
    /// Registered redirect URIs; non-empty, every entry an absolute URL
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub sso_tier: SsoTier,
    /// Tier-specific configuration blob
    #[serde(default)]
    pub config: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Redirect URIs must be non-empty and absolute
    pub fn validate_redirect_uris(uris: &[String]) -> Result<()> {
        if uris.is_empty() {
            return Err(AllianceError::invalid_config(
                "At least one redirect URI is required",
            ));
        }
        for uri in uris {
            let parsed = url::Url::parse(uri).map_err(|e| {
                AllianceError::invalid_config(format!("Invalid redirect URI {}: {}", uri, e))
            })?;
            if parsed.cannot_be_a_base() {
                return Err(AllianceError::invalid_config(format!(
                    "Redirect URI must be an absolute URL: {}",
                    uri
                )));
            }
        }
        Ok(())
    }
}
