//! Repository and capability traits at the engine's seams

use crate::{
    client::Client,
    directory::{DirectoryListing, ExternalGroup, ExternalUser},
    error::{AllianceError, Result},
    ids::{ClientId, ExternalGroupId, ExternalUserId, ProviderId},
    provider::Provider,
};
use async_trait::async_trait;
use base64::Engine;

/// Repository for provider configuration records
#[async_trait]
pub trait ProviderRepository: Send + Sync {
    async fn create(&self, provider: &Provider) -> Result<Provider>;

    async fn get(&self, id: ProviderId) -> Result<Option<Provider>>;

    async fn find_by_name(&self, name: &str) -> Result<Option<Provider>>;

    async fn list(&self) -> Result<Vec<Provider>>;

    async fn list_enabled(&self) -> Result<Vec<Provider>>;

    async fn update(&self, provider: &Provider) -> Result<Provider>;

    /// Deletes the provider and cascades to its clients and directory snapshots
    async fn delete(&self, id: ProviderId) -> Result<()>;
}

/// Repository for relying-party client records
#[async_trait]
pub trait ClientRepository: Send + Sync {
    async fn create(&self, client: &Client) -> Result<Client>;

    async fn get(&self, id: ClientId) -> Result<Option<Client>>;

    async fn find_by_app(&self, provider_id: ProviderId, app_name: &str)
        -> Result<Option<Client>>;

    async fn list_by_provider(&self, provider_id: ProviderId) -> Result<Vec<Client>>;

    async fn count(&self) -> Result<u64>;

    async fn update(&self, client: &Client) -> Result<Client>;

    /// Idempotent: deleting an unknown client is not an error
    async fn delete(&self, id: ClientId) -> Result<()>;
}

/// Repository for the federated directory cache
#[async_trait]
pub trait DirectoryRepository: Send + Sync {
    async fn list_users(&self, provider_id: ProviderId) -> Result<Vec<ExternalUser>>;

    async fn list_all_users(&self) -> Result<Vec<ExternalUser>>;

    async fn get_user(&self, id: ExternalUserId) -> Result<Option<ExternalUser>>;

    async fn get_user_by_external_id(
        &self,
        provider_id: ProviderId,
        external_id: &str,
    ) -> Result<Option<ExternalUser>>;

    async fn insert_user(&self, user: &ExternalUser) -> Result<ExternalUser>;

    async fn update_user(&self, user: &ExternalUser) -> Result<ExternalUser>;

    async fn delete_user(&self, id: ExternalUserId) -> Result<()>;

    async fn count_users(&self) -> Result<u64>;

    async fn list_groups(&self, provider_id: ProviderId) -> Result<Vec<ExternalGroup>>;

    async fn get_group(&self, id: ExternalGroupId) -> Result<Option<ExternalGroup>>;

    async fn get_group_by_external_id(
        &self,
        provider_id: ProviderId,
        external_id: &str,
    ) -> Result<Option<ExternalGroup>>;

    async fn insert_group(&self, group: &ExternalGroup) -> Result<ExternalGroup>;

    async fn update_group(&self, group: &ExternalGroup) -> Result<ExternalGroup>;

    async fn delete_group(&self, id: ExternalGroupId) -> Result<()>;
}

/// Encryption-at-rest capability consumed by the registries.
///
/// Secrets are encrypted before persistence and decrypted only at the point
/// of delivery (protocol client construction, credential injection).
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<Vec<u8>>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<String>;

    /// Encrypt to the base64 form stored inside configuration payloads
    fn encrypt_b64(&self, plaintext: &str) -> Result<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.encrypt(plaintext)?))
    }

    /// Decrypt from the base64 form stored inside configuration payloads
    fn decrypt_b64(&self, encoded: &str) -> Result<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| AllianceError::internal_error(format!("Invalid ciphertext: {}", e)))?;
        self.decrypt(&bytes)
    }
}

/// A provider-side bulk directory listing.
///
/// LDAP-capable providers implement this; OIDC has no bulk query and
/// populates the cache incrementally on login instead.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn fetch_directory(&self) -> Result<DirectoryListing>;
}

/// Resolves the directory source for a provider, if its type supports bulk
/// listing. `Ok(None)` means reconciliation is a no-op for this provider.
#[async_trait]
pub trait DirectorySourceResolver: Send + Sync {
    async fn source_for(
        &self,
        provider: &Provider,
    ) -> Result<Option<std::sync::Arc<dyn DirectorySource>>>;
}
