//! Credential and context injection.
//!
//! Turns a resolved tier into the concrete artifacts a workload manager
//! applies to the application: identity headers, environment variables, and
//! one-shot post-deploy commands. This is the single point where secrets
//! stored encrypted at rest are decrypted for delivery; nothing produced
//! here is persisted.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use alliance_core::{AllianceError, Provider, Result, SecretCipher, SsoTier};
use alliance_identity::{ClientRegistry, ClientSpec};

use crate::profile::AppCompatibilityProfile;

/// Placeholders resolved in tier-3 environment templates
const PLACEHOLDER_ISSUER: &str = "${ALLIANCE_ISSUER}";
const PLACEHOLDER_CLIENT_ID: &str = "${ALLIANCE_CLIENT_ID}";
const PLACEHOLDER_CLIENT_SECRET: &str = "${ALLIANCE_CLIENT_SECRET}";
const PLACEHOLDER_CALLBACK_URL: &str = "${ALLIANCE_CALLBACK_URL}";

/// What the workload manager applies to the application
#[derive(Debug, Clone, Default)]
pub struct DeploymentArtifacts {
    /// Header name -> claim name, enforced by the fronting proxy (tier 2)
    pub headers: HashMap<String, String>,
    pub env: HashMap<String, String>,
    /// Commands to run once after the deploy (tier 3)
    pub post_deploy_commands: Vec<String>,
}

/// One injection job
pub struct InjectionRequest<'a> {
    pub provider: &'a Provider,
    pub profile: &'a AppCompatibilityProfile,
    pub tier: SsoTier,
    /// Backing workload of the application, recorded on the tier-3 client
    pub container_ref: Option<String>,
    /// The application's own callback URLs, required at tier 3
    pub redirect_uris: Vec<String>,
}

pub struct CredentialInjector {
    clients: Arc<ClientRegistry>,
    cipher: Arc<dyn SecretCipher>,
}

impl CredentialInjector {
    pub fn new(clients: Arc<ClientRegistry>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self { clients, cipher }
    }

    #[instrument(skip(self, request), fields(app = %request.profile.app_name, tier = %request.tier))]
    pub async fn inject(&self, request: InjectionRequest<'_>) -> Result<DeploymentArtifacts> {
        if !request.provider.enabled {
            return Err(AllianceError::invalid_config(format!(
                "Provider '{}' is disabled",
                request.provider.name
            )));
        }

        let artifacts = match request.tier {
            // The proxy makes the allow/deny decision at request time;
            // nothing reaches the application itself.
            SsoTier::ForwardAuth => DeploymentArtifacts::default(),
            SsoTier::Headers => DeploymentArtifacts {
                headers: request.profile.headers.clone(),
                env: request.profile.env.clone(),
                post_deploy_commands: Vec::new(),
            },
            SsoTier::Oidc => self.inject_oidc(&request).await?,
            SsoTier::Ldap => self.inject_ldap(&request)?,
        };

        info!(
            headers = artifacts.headers.len(),
            env = artifacts.env.len(),
            "Produced deployment artifacts"
        );
        Ok(artifacts)
    }

    /// Tier 3: reuse or register a relying-party client and resolve the
    /// profile's placeholders with its credentials.
    async fn inject_oidc(&self, request: &InjectionRequest<'_>) -> Result<DeploymentArtifacts> {
        let issuer = request.provider.oidc_config()?.issuer_url.clone();

        let (client, fresh_secret) = self
            .clients
            .find_or_register(ClientSpec {
                provider_id: request.provider.id,
                app_name: request.profile.app_name.clone(),
                container_ref: request.container_ref.clone(),
                redirect_uris: request.redirect_uris.clone(),
                scopes: Vec::new(),
                sso_tier: SsoTier::Oidc,
                config: serde_json::Value::Null,
            })
            .await?;

        let client_secret = match fresh_secret {
            Some(secret) => secret,
            None => self.clients.reveal_secret(&client)?,
        };
        let callback_url = client
            .redirect_uris
            .first()
            .cloned()
            .unwrap_or_default();

        let mut env = HashMap::new();
        for (name, template) in &request.profile.env {
            let value = template
                .replace(PLACEHOLDER_ISSUER, &issuer)
                .replace(PLACEHOLDER_CLIENT_ID, &client.client_id)
                .replace(PLACEHOLDER_CLIENT_SECRET, &client_secret)
                .replace(PLACEHOLDER_CALLBACK_URL, &callback_url);

            // Unknown placeholders pass through literally
            if value.contains("${ALLIANCE_") {
                warn!(var = %name, "Unresolved placeholder in environment template");
            }
            env.insert(name.clone(), value);
        }

        Ok(DeploymentArtifacts {
            headers: HashMap::new(),
            env,
            post_deploy_commands: request.profile.post_deploy_commands.clone(),
        })
    }

    /// Tier 4: LDAP connection environment; no per-app client is created
    fn inject_ldap(&self, request: &InjectionRequest<'_>) -> Result<DeploymentArtifacts> {
        let config = request.provider.ldap_config()?;

        let mut env = request.profile.env.clone();
        env.insert(
            "ALLIANCE_LDAP_SERVER_URL".to_string(),
            config.server_url.clone(),
        );
        env.insert("ALLIANCE_LDAP_BASE_DN".to_string(), config.base_dn.clone());
        env.insert("ALLIANCE_LDAP_BIND_DN".to_string(), config.bind_dn.clone());
        if !config.bind_password.is_empty() {
            env.insert(
                "ALLIANCE_LDAP_BIND_PASSWORD".to_string(),
                self.cipher.decrypt_b64(&config.bind_password)?,
            );
        }

        Ok(DeploymentArtifacts {
            headers: HashMap::new(),
            env,
            post_deploy_commands: Vec::new(),
        })
    }
}
