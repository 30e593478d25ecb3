//! Relying-party client registry.
//!
//! Applications integrating at the OIDC tier get a dedicated client per
//! provider, with generated credentials and the secret encrypted at rest.

use base64::Engine;
use chrono::Utc;
use rand::RngCore;
use std::sync::Arc;
use tracing::{info, instrument};

use alliance_core::{
    AllianceError, Client, ClientId, ClientRepository, ProviderId, ProviderRepository, Result,
    SecretCipher, SsoTier,
};

/// Request to register an application as a relying party
#[derive(Debug, Clone)]
pub struct ClientSpec {
    pub provider_id: ProviderId,
    pub app_name: String,
    pub container_ref: Option<String>,
    pub redirect_uris: Vec<String>,
    pub scopes: Vec<String>,
    pub sso_tier: SsoTier,
    pub config: serde_json::Value,
}

/// A freshly issued client with its secret in plaintext.
///
/// The only point at which the plaintext secret exists outside the cipher;
/// callers hand it to the application and drop it.
#[derive(Debug)]
pub struct IssuedClient {
    pub client: Client,
    pub client_secret: String,
}

pub struct ClientRegistry {
    repo: Arc<dyn ClientRepository>,
    providers: Arc<dyn ProviderRepository>,
    cipher: Arc<dyn SecretCipher>,
}

impl ClientRegistry {
    pub fn new(
        repo: Arc<dyn ClientRepository>,
        providers: Arc<dyn ProviderRepository>,
        cipher: Arc<dyn SecretCipher>,
    ) -> Self {
        Self {
            repo,
            providers,
            cipher,
        }
    }

    /// Register an application against a provider.
    ///
    /// The provider must exist and be enabled; redirect URIs must be
    /// non-empty absolute URLs. Credentials are generated here, never
    /// supplied by the caller.
    #[instrument(skip(self, spec), fields(provider_id = %spec.provider_id, app = %spec.app_name))]
    pub async fn register(&self, spec: ClientSpec) -> Result<IssuedClient> {
        Client::validate_redirect_uris(&spec.redirect_uris)?;

        let provider = self
            .providers
            .get(spec.provider_id)
            .await?
            .ok_or_else(|| {
                AllianceError::not_found("provider", spec.provider_id.to_string())
            })?;
        if !provider.enabled {
            return Err(AllianceError::invalid_config(format!(
                "Provider '{}' is disabled",
                provider.name
            )));
        }

        if self
            .repo
            .find_by_app(spec.provider_id, &spec.app_name)
            .await?
            .is_some()
        {
            return Err(AllianceError::invalid_config(format!(
                "Application '{}' is already registered against this provider",
                spec.app_name
            )));
        }

        let client_secret = generate_secret();
        let now = Utc::now();
        let client = Client {
            id: ClientId::new(),
            provider_id: spec.provider_id,
            container_ref: spec.container_ref,
            app_name: spec.app_name,
            client_id: generate_client_id(),
            client_secret_enc: self.cipher.encrypt_b64(&client_secret)?,
            redirect_uris: spec.redirect_uris,
            scopes: if spec.scopes.is_empty() {
                vec!["openid".into(), "profile".into(), "email".into()]
            } else {
                spec.scopes
            },
            sso_tier: spec.sso_tier,
            config: spec.config,
            created_at: now,
            updated_at: now,
        };

        let client = self.repo.create(&client).await?;
        info!(client_id = %client.id, "Client registered");
        Ok(IssuedClient {
            client,
            client_secret,
        })
    }

    /// Fetch an existing registration for an app, or issue a new one.
    ///
    /// An existing registration never re-reveals its secret; rotate instead.
    pub async fn find_or_register(&self, spec: ClientSpec) -> Result<(Client, Option<String>)> {
        if let Some(existing) = self
            .repo
            .find_by_app(spec.provider_id, &spec.app_name)
            .await?
        {
            return Ok((existing, None));
        }
        let issued = self.register(spec).await?;
        Ok((issued.client, Some(issued.client_secret)))
    }

    pub async fn get(&self, id: ClientId) -> Result<Client> {
        self.repo
            .get(id)
            .await?
            .ok_or(AllianceError::ClientNotFound { id: id.to_string() })
    }

    pub async fn list_by_provider(&self, provider_id: ProviderId) -> Result<Vec<Client>> {
        self.repo.list_by_provider(provider_id).await
    }

    pub async fn count(&self) -> Result<u64> {
        self.repo.count().await
    }

    /// Replace a client's secret; the old one stops working immediately
    #[instrument(skip(self), fields(client_id = %id))]
    pub async fn rotate_secret(&self, id: ClientId) -> Result<IssuedClient> {
        let mut client = self.get(id).await?;
        let client_secret = generate_secret();
        client.client_secret_enc = self.cipher.encrypt_b64(&client_secret)?;
        client.updated_at = Utc::now();
        let client = self.repo.update(&client).await?;
        info!("Client secret rotated");
        Ok(IssuedClient {
            client,
            client_secret,
        })
    }

    /// Update the registered redirect URIs
    pub async fn update_redirect_uris(&self, id: ClientId, uris: Vec<String>) -> Result<Client> {
        Client::validate_redirect_uris(&uris)?;
        let mut client = self.get(id).await?;
        client.redirect_uris = uris;
        client.updated_at = Utc::now();
        self.repo.update(&client).await
    }

    /// Idempotent delete
    #[instrument(skip(self), fields(client_id = %id))]
    pub async fn delete(&self, id: ClientId) -> Result<()> {
        self.repo.delete(id).await
    }

    /// Decrypt a client's stored secret. Delivery-point use only.
    pub fn reveal_secret(&self, client: &Client) -> Result<String> {
        self.cipher.decrypt_b64(&client.client_secret_enc)
    }
}

fn generate_client_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}
