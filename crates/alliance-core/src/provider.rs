//! Identity provider model: the type-tagged configuration union and the
//! capability surface each provider type exposes.
//!
//! Provider-type behavior is dispatched on the closed [`ProviderType`] enum so
//! that adding a fourth provider type is a compile-time-checked change rather
//! than a string switch scattered across components.

use crate::{
    client::SsoTier,
    error::{AllianceError, Result},
    ids::ProviderId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Supported identity provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    /// OpenID Connect provider (authorization-code flow)
    Oidc,
    /// SAML 2.0 identity provider
    Saml,
    /// LDAP / Active Directory
    Ldap,
}

impl ProviderType {
    /// Integration tiers this provider type can satisfy.
    ///
    /// SAML app-native integration is not modeled, so SAML providers only
    /// support proxy-level forward-auth.
    pub fn supported_tiers(&self) -> &'static [SsoTier] {
        match self {
            Self::Oidc => &[SsoTier::ForwardAuth, SsoTier::Headers, SsoTier::Oidc],
            Self::Ldap => &[SsoTier::ForwardAuth, SsoTier::Headers, SsoTier::Ldap],
            Self::Saml => &[SsoTier::ForwardAuth],
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Oidc => write!(f, "oidc"),
            Self::Saml => write!(f, "saml"),
            Self::Ldap => write!(f, "ldap"),
        }
    }
}

impl std::str::FromStr for ProviderType {
    type Err = AllianceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "oidc" => Ok(Self::Oidc),
            "saml" => Ok(Self::Saml),
            "ldap" => Ok(Self::Ldap),
            other => Err(AllianceError::invalid_config(format!(
                "Unknown provider type: {}",
                other
            ))),
        }
    }
}

/// Type-tagged provider configuration payload.
///
/// Exactly one variant is populated per provider, matching its declared
/// [`ProviderType`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProviderConfig {
    Oidc(OidcConfig),
    Saml(SamlConfig),
    Ldap(LdapConfig),
}

impl ProviderConfig {
    /// The provider type this payload belongs to
    pub fn provider_type(&self) -> ProviderType {
        match self {
            Self::Oidc(_) => ProviderType::Oidc,
            Self::Saml(_) => ProviderType::Saml,
            Self::Ldap(_) => ProviderType::Ldap,
        }
    }

    /// Validate type-specific required fields.
    ///
    /// Runs before any network call; violations are [`AllianceError::InvalidConfig`].
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Oidc(c) => {
                if c.issuer_url.trim().is_empty() {
                    return Err(AllianceError::invalid_config("OIDC issuer URL is required"));
                }
                if c.client_id.trim().is_empty() {
                    return Err(AllianceError::invalid_config("OIDC client id is required"));
                }
                Ok(())
            }
            Self::Ldap(c) => {
                if c.server_url.trim().is_empty() {
                    return Err(AllianceError::invalid_config("LDAP server URL is required"));
                }
                if c.base_dn.trim().is_empty() {
                    return Err(AllianceError::invalid_config("LDAP base DN is required"));
                }
                Ok(())
            }
            Self::Saml(c) => {
                if c.entity_id.trim().is_empty() {
                    return Err(AllianceError::invalid_config("SAML entity id is required"));
                }
                if c.metadata_url.is_none() && c.metadata_xml.is_none() {
                    return Err(AllianceError::invalid_config(
                        "SAML provider requires a metadata URL or inline metadata XML",
                    ));
                }
                Ok(())
            }
        }
    }
}

/// OIDC provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcConfig {
    /// Issuer URL (used for discovery)
    pub issuer_url: String,
    /// Client ID registered at the provider
    pub client_id: String,
    /// Client secret. Plaintext on input; the provider registry replaces it
    /// with the base64 nonce+ciphertext form before persistence.
    pub client_secret: String,
    /// Authorization endpoint (overrides discovery)
    pub authorization_endpoint: Option<String>,
    /// Token endpoint (overrides discovery)
    pub token_endpoint: Option<String>,
    /// UserInfo endpoint (overrides discovery)
    pub userinfo_endpoint: Option<String>,
    /// JWKS URI (overrides discovery)
    pub jwks_uri: Option<String>,
    /// Scopes to request; `openid profile email` when empty
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Operator claim name overrides
    #[serde(default)]
    pub claim_mappings: ClaimMappings,
}

/// Operator-configurable claim names for extracting [`crate::UserInfo`]
/// from a verified ID token.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClaimMappings {
    /// Claim for the username (default `preferred_username`)
    pub username_claim: Option<String>,
    /// Claim for email (default `email`)
    pub email_claim: Option<String>,
    /// Claim for group membership (default `groups`)
    pub groups_claim: Option<String>,
    /// Claim for display name (default `name`)
    pub display_name_claim: Option<String>,
}

impl ClaimMappings {
    pub fn username_claim(&self) -> &str {
        self.username_claim.as_deref().unwrap_or("preferred_username")
    }

    pub fn email_claim(&self) -> &str {
        self.email_claim.as_deref().unwrap_or("email")
    }

    pub fn groups_claim(&self) -> &str {
        self.groups_claim.as_deref().unwrap_or("groups")
    }

    pub fn display_name_claim(&self) -> &str {
        self.display_name_claim.as_deref().unwrap_or("name")
    }
}

/// SAML provider configuration.
///
/// SAML wire protocol handling is out of scope; the engine models and stores
/// these providers and probes their metadata endpoint for connectivity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SamlConfig {
    /// IdP entity ID
    pub entity_id: String,
    /// Metadata document URL
    pub metadata_url: Option<String>,
    /// Inline metadata XML (alternative to the URL)
    pub metadata_xml: Option<String>,
    /// IdP SSO URL, if known ahead of metadata resolution
    pub sso_url: Option<String>,
    /// IdP signing certificate (PEM)
    pub certificate: Option<String>,
}

/// LDAP provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server URL (e.g. `ldaps://ldap.example.com:636`)
    pub server_url: String,
    /// Base DN for searches
    pub base_dn: String,
    /// Bind DN for the service account
    pub bind_dn: String,
    /// Bind password. Plaintext on input; encrypted at rest like the OIDC
    /// client secret.
    pub bind_password: String,
    /// User search filter
    #[serde(default = "default_user_filter")]
    pub user_filter: String,
    /// Base DN for group search; user base DN when absent
    pub group_base_dn: Option<String>,
    /// Group search filter
    pub group_filter: Option<String>,
    /// Attribute mappings
    #[serde(default)]
    pub attribute_mappings: LdapAttributeMappings,
    /// Use StartTLS
    #[serde(default)]
    pub start_tls: bool,
}

fn default_user_filter() -> String {
    "(objectClass=person)".to_string()
}

/// LDAP attribute mappings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LdapAttributeMappings {
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub member_of: Option<String>,
    pub group_name: Option<String>,
    pub group_description: Option<String>,
}

impl Default for LdapAttributeMappings {
    fn default() -> Self {
        Self {
            username: "uid".to_string(),
            email: "mail".to_string(),
            display_name: Some("displayName".to_string()),
            member_of: Some("memberOf".to_string()),
            group_name: Some("cn".to_string()),
            group_description: Some("description".to_string()),
        }
    }
}

/// An identity provider attached to the fleet
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub id: ProviderId,
    pub name: String,
    pub provider_type: ProviderType,
    pub enabled: bool,
    /// Whether the provider is itself a deployed workload (vs. externally hosted)
    pub is_managed: bool,
    /// Opaque reference to the managing workload, if any
    pub container_ref: Option<String>,
    /// Type-tagged configuration payload; invariant: matches `provider_type`
    pub config: ProviderConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Provider {
    /// Fails when the configuration payload does not match the declared type
    /// or misses type-specific required fields.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(AllianceError::invalid_config("Provider name is required"));
        }
        if self.config.provider_type() != self.provider_type {
            return Err(AllianceError::invalid_config(format!(
                "Configuration payload is for {} but provider type is {}",
                self.config.provider_type(),
                self.provider_type
            )));
        }
        self.config.validate()
    }

    pub fn oidc_config(&self) -> Result<&OidcConfig> {
        match &self.config {
            ProviderConfig::Oidc(c) => Ok(c),
            _ => Err(AllianceError::invalid_config(format!(
                "Provider {} is not an OIDC provider",
                self.id
            ))),
        }
    }

    pub fn ldap_config(&self) -> Result<&LdapConfig> {
        match &self.config {
            ProviderConfig::Ldap(c) => Ok(c),
            _ => Err(AllianceError::invalid_config(format!(
                "Provider {} is not an LDAP provider",
                self.id
            ))),
        }
    }
}

/// Specification for creating a new provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub provider_type: ProviderType,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub is_managed: bool,
    #[serde(default)]
    pub container_ref: Option<String>,
    pub config: ProviderConfig,
}

fn default_true() -> bool {
    true
}

/// Partial update for an existing provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderUpdate {
    pub name: Option<String>,
    pub enabled: Option<bool>,
    pub is_managed: Option<bool>,
    pub container_ref: Option<Option<String>>,
    pub config: Option<ProviderConfig>,
}
