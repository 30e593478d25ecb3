//! Shared HTTP, JWKS, and discovery plumbing for protocol clients

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, DecodingKey, Validation};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use alliance_core::{AllianceError, Result};

/// Deadline for discovery, code exchange, and refresh calls
pub const EXCHANGE_TIMEOUT: Duration = Duration::from_secs(30);
/// Deadline for signature-key fetches during token verification
pub const VERIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin reqwest wrapper applying an explicit per-request deadline.
///
/// The engine never retries on its own; transport failures surface as
/// `ProviderUnreachable` and the caller owns backoff policy.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(EXCHANGE_TIMEOUT)
            .build()
            .map_err(|e| {
                AllianceError::internal_error(format!("Failed to create HTTP client: {}", e))
            })?;
        Ok(Self { client })
    }

    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET a JSON document under the given deadline
    pub async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        timeout: Duration,
    ) -> Result<T> {
        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| AllianceError::provider_unreachable(format!("GET {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(AllianceError::provider_unreachable(format!(
                "GET {}: HTTP {}",
                url,
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            AllianceError::provider_unreachable(format!("GET {}: invalid body: {}", url, e))
        })
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient").finish()
    }
}

/// OIDC discovery document (`/.well-known/openid-configuration`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OidcDiscovery {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,
    pub jwks_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signing_alg_values_supported: Option<Vec<String>>,
}

impl OidcDiscovery {
    /// Fetch the discovery document from the issuer's well-known endpoint
    pub async fn fetch(issuer: &str, client: &HttpClient) -> Result<Self> {
        let url = format!(
            "{}/.well-known/openid-configuration",
            issuer.trim_end_matches('/')
        );
        debug!("Fetching OIDC discovery from {}", url);
        client.get_json(&url, EXCHANGE_TIMEOUT).await
    }
}

/// Token endpoint response for code exchange and refresh
#[derive(Debug, Clone, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// JSON Web Key Set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// JSON Web Key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    #[serde(rename = "use", skip_serializing_if = "Option::is_none")]
    pub key_use: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alg: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crv: Option<String>,
}

impl JwkSet {
    pub fn find_key(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid.as_deref() == Some(kid))
    }

    /// Build a decoding key for the given kid
    pub fn get_decoding_key(&self, kid: &str) -> Result<DecodingKey> {
        let jwk = self.find_key(kid).ok_or_else(|| {
            AllianceError::token_verification_failed(format!(
                "Key with kid '{}' not found in JWKS",
                kid
            ))
        })?;

        match jwk.kty.as_str() {
            "RSA" => {
                let n = jwk.n.as_ref().ok_or_else(|| {
                    AllianceError::token_verification_failed("RSA key missing 'n' parameter")
                })?;
                let e = jwk.e.as_ref().ok_or_else(|| {
                    AllianceError::token_verification_failed("RSA key missing 'e' parameter")
                })?;
                DecodingKey::from_rsa_components(n, e).map_err(|e| {
                    AllianceError::token_verification_failed(format!("Invalid RSA key: {}", e))
                })
            }
            "EC" => {
                let x = jwk.x.as_ref().ok_or_else(|| {
                    AllianceError::token_verification_failed("EC key missing 'x' parameter")
                })?;
                let y = jwk.y.as_ref().ok_or_else(|| {
                    AllianceError::token_verification_failed("EC key missing 'y' parameter")
                })?;
                DecodingKey::from_ec_components(x, y).map_err(|e| {
                    AllianceError::token_verification_failed(format!("Invalid EC key: {}", e))
                })
            }
            other => Err(AllianceError::token_verification_failed(format!(
                "Unsupported key type: {}",
                other
            ))),
        }
    }
}

/// Cache for provider JWKS documents
pub struct JwksCache {
    keys: RwLock<HashMap<String, CachedJwks>>,
    ttl_secs: u64,
}

struct CachedJwks {
    keys: JwkSet,
    fetched_at: DateTime<Utc>,
}

impl JwksCache {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub async fn get_or_fetch(&self, jwks_uri: &str, client: &HttpClient) -> Result<JwkSet> {
        {
            let cache = self.keys.read().await;
            if let Some(cached) = cache.get(jwks_uri) {
                let age = (Utc::now() - cached.fetched_at).num_seconds() as u64;
                if age < self.ttl_secs {
                    return Ok(cached.keys.clone());
                }
            }
        }

        debug!("Fetching JWKS from {}", jwks_uri);
        let jwks: JwkSet = client.get_json(jwks_uri, VERIFY_TIMEOUT).await?;

        {
            let mut cache = self.keys.write().await;
            cache.insert(
                jwks_uri.to_string(),
                CachedJwks {
                    keys: jwks.clone(),
                    fetched_at: Utc::now(),
                },
            );
        }

        Ok(jwks)
    }

    pub async fn invalidate(&self, jwks_uri: &str) {
        self.keys.write().await.remove(jwks_uri);
    }
}

/// Decode and validate a JWT into raw claims
pub fn validate_jwt(
    token: &str,
    decoding_key: &DecodingKey,
    validation: &Validation,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    let token_data = decode::<serde_json::Map<String, serde_json::Value>>(
        token,
        decoding_key,
        validation,
    )
    .map_err(|e| {
        AllianceError::token_verification_failed(format!("Token validation failed: {}", e))
    })?;
    Ok(token_data.claims)
}

/// Extract the kid from a JWT header
pub fn extract_jwt_kid(token: &str) -> Result<String> {
    let header = decode_header(token).map_err(|e| {
        AllianceError::token_verification_failed(format!("Failed to decode JWT header: {}", e))
    })?;

    header.kid.ok_or_else(|| {
        AllianceError::token_verification_failed("JWT header missing 'kid' field")
    })
}
