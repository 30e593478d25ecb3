//! Provider registry: CRUD over identity providers with secret encryption,
//! lifecycle validation, and a cache of initialized OIDC protocol clients.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use alliance_core::{
    AllianceError, Provider, ProviderConfig, ProviderId, ProviderRepository, ProviderSpec,
    ProviderType, ProviderUpdate, Result, SecretCipher,
};

use crate::common::{HttpClient, OidcDiscovery};
use crate::oidc::OidcClient;
use crate::state::StateStore;

/// Outcome of a connectivity probe against a provider
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ConnectionTest {
    fn ok(message: impl Into<String>, details: Option<serde_json::Value>) -> Self {
        Self {
            success: true,
            message: message.into(),
            details,
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            details: None,
        }
    }
}

/// RAII marker for a login flow in progress against one provider.
///
/// Deleting a provider while one of these is live is refused, so a user
/// mid-redirect does not come back to a 404 callback.
pub struct FlowGuard {
    provider_id: ProviderId,
    in_flight: Arc<Mutex<HashMap<ProviderId, u32>>>,
}

impl Drop for FlowGuard {
    fn drop(&mut self) {
        let mut counts = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(count) = counts.get_mut(&self.provider_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                counts.remove(&self.provider_id);
            }
        }
    }
}

/// Registry over configured identity providers.
///
/// Wraps the repository with config validation, client-secret encryption at
/// rest, and a per-provider cache of [`OidcClient`] instances keyed by id.
/// The cache entry is dropped on any update or delete so configuration
/// changes take effect on the next login.
pub struct ProviderRegistry {
    repo: Arc<dyn ProviderRepository>,
    cipher: Arc<dyn SecretCipher>,
    state_store: Arc<dyn StateStore>,
    public_base_url: String,
    clients: RwLock<HashMap<ProviderId, Arc<OidcClient>>>,
    in_flight: Arc<Mutex<HashMap<ProviderId, u32>>>,
}

impl ProviderRegistry {
    pub fn new(
        repo: Arc<dyn ProviderRepository>,
        cipher: Arc<dyn SecretCipher>,
        state_store: Arc<dyn StateStore>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            repo,
            cipher,
            state_store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
            clients: RwLock::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Callback URL this deployment exposes for a provider
    pub fn callback_url(&self, id: ProviderId) -> String {
        format!("{}/providers/{}/callback", self.public_base_url, id)
    }

    /// Register a provider. Validates the config, rejects duplicate names,
    /// and encrypts any plaintext client secret before persisting.
    #[instrument(skip(self, spec), fields(name = %spec.name))]
    pub async fn create(&self, spec: ProviderSpec) -> Result<Provider> {
        if self.repo.find_by_name(&spec.name).await?.is_some() {
            return Err(AllianceError::invalid_config(format!(
                "Provider name '{}' is already in use",
                spec.name
            )));
        }

        let mut config = spec.config;
        let now = chrono::Utc::now();
        let provider = Provider {
            id: ProviderId::new(),
            name: spec.name,
            provider_type: spec.provider_type,
            enabled: spec.enabled,
            is_managed: spec.is_managed,
            container_ref: spec.container_ref,
            config: config.clone(),
            created_at: now,
            updated_at: now,
        };
        provider.validate()?;

        self.encrypt_secrets(&mut config)?;
        let provider = Provider { config, ..provider };

        let provider = self.repo.create(&provider).await?;
        info!(provider_id = %provider.id, "Provider registered");
        Ok(provider)
    }

    pub async fn get(&self, id: ProviderId) -> Result<Provider> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| AllianceError::not_found("provider", id.to_string()))
    }

    pub async fn find_by_name(&self, name: &str) -> Result<Option<Provider>> {
        self.repo.find_by_name(name).await
    }

    pub async fn list(&self) -> Result<Vec<Provider>> {
        self.repo.list().await
    }

    pub async fn list_enabled(&self) -> Result<Vec<Provider>> {
        self.repo.list_enabled().await
    }

    /// Apply a partial update. A config change is validated and re-encrypted;
    /// changing the provider type is refused. The cached protocol client is
    /// invalidated either way.
    #[instrument(skip(self, update), fields(provider_id = %id))]
    pub async fn update(&self, id: ProviderId, mut update: ProviderUpdate) -> Result<Provider> {
        let mut provider = self.get(id).await?;

        if let Some(config) = update.config.as_mut() {
            if config.provider_type() != provider.provider_type {
                return Err(AllianceError::invalid_config(format!(
                    "Cannot change provider type from {} to {}",
                    provider.provider_type,
                    config.provider_type()
                )));
            }
            config.validate()?;
            self.encrypt_secrets(config)?;
        }

        if let Some(name) = update.name.as_deref() {
            if name != provider.name && self.repo.find_by_name(name).await?.is_some() {
                return Err(AllianceError::invalid_config(format!(
                    "Provider name '{}' is already in use",
                    name
                )));
            }
        }

        if let Some(name) = update.name {
            provider.name = name;
        }
        if let Some(enabled) = update.enabled {
            provider.enabled = enabled;
        }
        if let Some(is_managed) = update.is_managed {
            provider.is_managed = is_managed;
        }
        if let Some(container_ref) = update.container_ref {
            provider.container_ref = container_ref;
        }
        if let Some(config) = update.config {
            provider.config = config;
        }
        provider.updated_at = chrono::Utc::now();

        let provider = self.repo.update(&provider).await?;
        self.clients.write().await.remove(&id);
        info!("Provider updated");
        Ok(provider)
    }

    /// Delete a provider and its directory state. Refused while a login flow
    /// against it is in progress.
    #[instrument(skip(self), fields(provider_id = %id))]
    pub async fn delete(&self, id: ProviderId) -> Result<()> {
        let live = {
            let counts = self
                .in_flight
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            counts.get(&id).copied().unwrap_or(0)
        };
        if live > 0 {
            return Err(AllianceError::ProviderInUse { id: id.to_string() });
        }

        self.get(id).await?;
        self.repo.delete(id).await?;
        self.clients.write().await.remove(&id);
        info!("Provider deleted");
        Ok(())
    }

    /// Mark a login flow in progress; the guard releases it on drop
    pub fn begin_flow(&self, id: ProviderId) -> FlowGuard {
        let mut counts = self
            .in_flight
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *counts.entry(id).or_insert(0) += 1;
        FlowGuard {
            provider_id: id,
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    /// Resolve the cached OIDC client for a provider, initializing it on
    /// first use. Discovery failures are not cached, so a transient outage
    /// retries on the next call.
    pub async fn oidc_client(&self, id: ProviderId) -> Result<Arc<OidcClient>> {
        if let Some(client) = self.clients.read().await.get(&id) {
            return Ok(Arc::clone(client));
        }

        let provider = self.get(id).await?;
        if !provider.enabled {
            return Err(AllianceError::invalid_config(format!(
                "Provider '{}' is disabled",
                provider.name
            )));
        }

        let mut config = provider.oidc_config()?.clone();
        config.client_secret = self.cipher.decrypt_b64(&config.client_secret)?;

        let client = Arc::new(
            OidcClient::discover(id, config, self.callback_url(id), Arc::clone(&self.state_store))
                .await?,
        );

        let mut cache = self.clients.write().await;
        // Another task may have raced the discovery; keep the first entry.
        let entry = cache.entry(id).or_insert_with(|| Arc::clone(&client));
        Ok(Arc::clone(entry))
    }

    /// Seed the client cache directly. Test hook for wiring a client built
    /// with a known discovery document.
    pub async fn install_client(&self, client: Arc<OidcClient>) {
        self.clients
            .write()
            .await
            .insert(client.provider_id(), client);
    }

    /// Probe provider connectivity without touching persisted state
    #[instrument(skip(self), fields(provider_id = %id))]
    pub async fn test_connection(&self, id: ProviderId) -> Result<ConnectionTest> {
        let provider = self.get(id).await?;

        let outcome = match provider.provider_type {
            ProviderType::Oidc => self.test_oidc(&provider).await,
            ProviderType::Ldap => self.test_ldap(&provider).await,
            ProviderType::Saml => self.test_saml(&provider).await,
        };

        match &outcome {
            Ok(test) if !test.success => warn!(message = %test.message, "Connection test failed"),
            Ok(_) => debug!("Connection test passed"),
            Err(e) => warn!(error = %e, "Connection test errored"),
        }
        outcome
    }

    async fn test_oidc(&self, provider: &Provider) -> Result<ConnectionTest> {
        let config = provider.oidc_config()?;
        let http = HttpClient::new()?;

        match OidcDiscovery::fetch(&config.issuer_url, &http).await {
            Ok(discovery) => Ok(ConnectionTest::ok(
                "Discovery document fetched",
                Some(serde_json::json!({
                    "issuer": discovery.issuer,
                    "authorization_endpoint": discovery.authorization_endpoint,
                    "token_endpoint": discovery.token_endpoint,
                    "jwks_uri": discovery.jwks_uri,
                })),
            )),
            Err(e) => Ok(ConnectionTest::failed(e.to_string())),
        }
    }

    #[cfg(feature = "ldap")]
    async fn test_ldap(&self, provider: &Provider) -> Result<ConnectionTest> {
        let source = crate::ldap::LdapDirectory::new(provider, Arc::clone(&self.cipher))?;
        match source.probe_bind().await {
            Ok(()) => Ok(ConnectionTest::ok("LDAP bind succeeded", None)),
            Err(e) => Ok(ConnectionTest::failed(e.to_string())),
        }
    }

    #[cfg(not(feature = "ldap"))]
    async fn test_ldap(&self, _provider: &Provider) -> Result<ConnectionTest> {
        Ok(ConnectionTest::failed(
            "LDAP connectivity tests require the ldap feature on this deployment",
        ))
    }

    async fn test_saml(&self, provider: &Provider) -> Result<ConnectionTest> {
        let config = match &provider.config {
            ProviderConfig::Saml(saml) => saml,
            _ => {
                return Err(AllianceError::invalid_config(
                    "Provider is marked SAML but carries a different config",
                ))
            }
        };

        match &config.metadata_url {
            Some(url) => {
                let http = HttpClient::new()?;
                let response = http
                    .inner()
                    .get(url)
                    .timeout(std::time::Duration::from_secs(10))
                    .send()
                    .await;
                match response {
                    Ok(resp) if resp.status().is_success() => Ok(ConnectionTest::ok(
                        "SAML metadata document fetched",
                        Some(serde_json::json!({ "metadata_url": url })),
                    )),
                    Ok(resp) => Ok(ConnectionTest::failed(format!(
                        "Metadata endpoint returned HTTP {}",
                        resp.status()
                    ))),
                    Err(e) => Ok(ConnectionTest::failed(format!(
                        "Metadata endpoint unreachable: {}",
                        e
                    ))),
                }
            }
            // Inline metadata was validated at configuration time.
            None => Ok(ConnectionTest::ok("SAML metadata accepted", None)),
        }
    }

    /// Decrypt a provider's stored client secret. Delivery-point use only.
    pub fn reveal_secret(&self, encrypted: &str) -> Result<String> {
        self.cipher.decrypt_b64(encrypted)
    }

    fn encrypt_secrets(&self, config: &mut ProviderConfig) -> Result<()> {
        match config {
            ProviderConfig::Oidc(oidc) if !oidc.client_secret.is_empty() => {
                oidc.client_secret = self.cipher.encrypt_b64(&oidc.client_secret)?;
            }
            ProviderConfig::Ldap(ldap) if !ldap.bind_password.is_empty() => {
                ldap.bind_password = self.cipher.encrypt_b64(&ldap.bind_password)?;
            }
            _ => {}
        }
        Ok(())
    }
}
