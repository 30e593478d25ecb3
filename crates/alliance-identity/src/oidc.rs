//! OIDC protocol client for a single provider.
//!
//! One client is constructed per enabled OIDC provider and cached by the
//! provider registry; construction performs discovery, so a cached client is
//! always in the Ready state. Per-login transitions (authorization URL,
//! code exchange, token verification, claim extraction) hang off that
//! instance.

use base64::Engine;
use jsonwebtoken::{Algorithm, Validation};
use rand::RngCore;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use alliance_core::{AllianceError, OidcConfig, ProviderId, Result, UserInfo};

use crate::common::{
    extract_jwt_kid, validate_jwt, HttpClient, JwksCache, OidcDiscovery, TokenSet,
    EXCHANGE_TIMEOUT,
};
use crate::state::StateStore;

/// Default scopes when the provider configuration names none
const DEFAULT_SCOPES: &str = "openid profile email";

/// An issued authorization URL together with its state token
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
}

/// Protocol client for one OIDC provider.
///
/// The configuration carried here holds the decrypted client secret; the
/// instance lives only in the registry cache and is dropped on provider
/// update or delete.
pub struct OidcClient {
    provider_id: ProviderId,
    config: OidcConfig,
    redirect_uri: String,
    discovery: OidcDiscovery,
    http: HttpClient,
    jwks_cache: JwksCache,
    state_store: Arc<dyn StateStore>,
}

impl OidcClient {
    /// Initialize against the provider's issuer: fetch the discovery document
    /// (30s bound) and verify its issuer matches the configured one.
    ///
    /// Network failures are `ProviderUnreachable` and are not cached; a
    /// malformed document or issuer mismatch is `InvalidConfig`.
    pub async fn discover(
        provider_id: ProviderId,
        config: OidcConfig,
        redirect_uri: String,
        state_store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        let http = HttpClient::new()?;
        let discovery = OidcDiscovery::fetch(&config.issuer_url, &http).await?;

        let configured = config.issuer_url.trim_end_matches('/');
        if discovery.issuer.trim_end_matches('/') != configured {
            return Err(AllianceError::invalid_config(format!(
                "Discovery issuer {} does not match configured issuer {}",
                discovery.issuer, config.issuer_url
            )));
        }

        Self::with_discovery(provider_id, config, redirect_uri, discovery, state_store)
    }

    /// Construct from an already resolved discovery document
    pub fn with_discovery(
        provider_id: ProviderId,
        config: OidcConfig,
        redirect_uri: String,
        discovery: OidcDiscovery,
        state_store: Arc<dyn StateStore>,
    ) -> Result<Self> {
        Ok(Self {
            provider_id,
            config,
            redirect_uri,
            discovery,
            http: HttpClient::new()?,
            jwks_cache: JwksCache::new(3600),
            state_store,
        })
    }

    pub fn provider_id(&self) -> ProviderId {
        self.provider_id
    }

    /// Configured endpoint overrides take precedence over discovery
    fn authorization_endpoint(&self) -> &str {
        self.config
            .authorization_endpoint
            .as_deref()
            .unwrap_or(&self.discovery.authorization_endpoint)
    }

    fn token_endpoint(&self) -> &str {
        self.config
            .token_endpoint
            .as_deref()
            .unwrap_or(&self.discovery.token_endpoint)
    }

    fn jwks_uri(&self) -> &str {
        self.config.jwks_uri.as_deref().unwrap_or(&self.discovery.jwks_uri)
    }

    fn issuer(&self) -> &str {
        &self.discovery.issuer
    }

    fn scopes(&self) -> String {
        if self.config.scopes.is_empty() {
            DEFAULT_SCOPES.to_string()
        } else {
            self.config.scopes.join(" ")
        }
    }

    /// Generate a fresh state token: 32 bytes of CSPRNG output, URL-safe
    pub fn generate_state() -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// Build the authorization URL for a login attempt.
    ///
    /// When no state is supplied a fresh one is generated; either way the
    /// token is registered single-use in the state store.
    #[instrument(skip(self, state), fields(provider_id = %self.provider_id))]
    pub async fn auth_url(&self, state: Option<String>) -> Result<AuthorizationRequest> {
        let state = state.unwrap_or_else(Self::generate_state);
        self.state_store.insert(self.provider_id, &state).await?;

        let url = format!(
            "{}?client_id={}&response_type=code&redirect_uri={}&scope={}&state={}",
            self.authorization_endpoint(),
            urlencoding::encode(&self.config.client_id),
            urlencoding::encode(&self.redirect_uri),
            urlencoding::encode(&self.scopes()),
            urlencoding::encode(&state),
        );

        debug!("Issued authorization URL");
        Ok(AuthorizationRequest { url, state })
    }

    /// Exchange an authorization code for a token set (30s bound)
    #[instrument(skip(self, code), fields(provider_id = %self.provider_id))]
    pub async fn exchange_code(&self, code: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_request(&params).await
    }

    /// Exchange a refresh token for a new token set (30s bound)
    #[instrument(skip(self, refresh_token), fields(provider_id = %self.provider_id))]
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenSet> {
        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        self.token_request(&params).await
    }

    async fn token_request(&self, params: &[(&str, &str)]) -> Result<TokenSet> {
        let response = self
            .http
            .inner()
            .post(self.token_endpoint())
            .form(params)
            .timeout(EXCHANGE_TIMEOUT)
            .send()
            .await
            .map_err(|e| {
                AllianceError::token_exchange_failed(format!("Token endpoint: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AllianceError::token_exchange_failed(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        response.json().await.map_err(|e| {
            AllianceError::token_exchange_failed(format!("Malformed token response: {}", e))
        })
    }

    /// Verify a raw ID token: signature against the provider's published
    /// keys, issuer, audience (= configured client id), and expiry.
    #[instrument(skip(self, raw_id_token), fields(provider_id = %self.provider_id))]
    pub async fn validate_id_token(
        &self,
        raw_id_token: &str,
    ) -> Result<serde_json::Map<String, Value>> {
        let kid = extract_jwt_kid(raw_id_token)?;
        let jwks = self.jwks_cache.get_or_fetch(self.jwks_uri(), &self.http).await?;
        let decoding_key = jwks.get_decoding_key(&kid)?;

        let alg = jwks
            .find_key(&kid)
            .and_then(|k| k.alg.as_deref())
            .and_then(|a| a.parse::<Algorithm>().ok())
            .unwrap_or(Algorithm::RS256);

        let mut validation = Validation::new(alg);
        validation.set_issuer(&[self.issuer()]);
        validation.set_audience(&[&self.config.client_id]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        validate_jwt(raw_id_token, &decoding_key, &validation)
    }

    /// Extract a [`UserInfo`] claim set using the operator's claim mappings.
    ///
    /// Fallback order is deterministic: username falls back from the mapped
    /// claim to email to the subject; display name from the mapped claim to
    /// `given_name + family_name` to the username. Missing optional claims
    /// leave fields empty; only `sub` is mandatory.
    pub fn user_info(&self, claims: &serde_json::Map<String, Value>) -> Result<UserInfo> {
        let mappings = &self.config.claim_mappings;

        let subject = claims
            .get("sub")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AllianceError::token_verification_failed("ID token missing 'sub' claim")
            })?;

        let email = str_claim(claims, mappings.email_claim()).unwrap_or_default();

        let username = str_claim(claims, mappings.username_claim())
            .or_else(|| if email.is_empty() { None } else { Some(email.clone()) })
            .unwrap_or_else(|| subject.clone());

        let display_name = str_claim(claims, mappings.display_name_claim())
            .or_else(|| {
                let given = str_claim(claims, "given_name");
                let family = str_claim(claims, "family_name");
                match (given, family) {
                    (None, None) => None,
                    (g, f) => Some(
                        format!("{} {}", g.unwrap_or_default(), f.unwrap_or_default())
                            .trim()
                            .to_string(),
                    ),
                }
            })
            .unwrap_or_else(|| username.clone());

        let groups = claims
            .get(mappings.groups_claim())
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(UserInfo {
            subject,
            username,
            email,
            display_name,
            groups,
        })
    }

    /// Drive a callback end to end: consume the state token (single-use),
    /// exchange the code, verify the ID token, and extract claims.
    #[instrument(skip(self, state, code), fields(provider_id = %self.provider_id))]
    pub async fn authenticate_callback(&self, state: &str, code: &str) -> Result<UserInfo> {
        self.state_store.consume(self.provider_id, state).await?;

        let tokens = self.exchange_code(code).await?;
        let raw_id_token = tokens.id_token.as_deref().ok_or_else(|| {
            AllianceError::token_exchange_failed("Token response carried no id_token")
        })?;

        let claims = self.validate_id_token(raw_id_token).await?;
        let info = self.user_info(&claims)?;

        debug!(subject = %info.subject, "Callback authenticated");
        Ok(info)
    }

    /// Connectivity probe: re-fetch the JWKS document
    pub async fn probe(&self) -> Result<()> {
        self.jwks_cache.invalidate(self.jwks_uri()).await;
        self.jwks_cache
            .get_or_fetch(self.jwks_uri(), &self.http)
            .await
            .map(|jwks| {
                if jwks.keys.is_empty() {
                    warn!("Provider JWKS is empty");
                }
            })
    }
}

fn str_claim(claims: &serde_json::Map<String, Value>, name: &str) -> Option<String> {
    claims
        .get(name)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
