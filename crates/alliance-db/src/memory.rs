//! In-memory repository implementations.
//!
//! Back the engine for tests and single-node evaluation runs. They enforce
//! the same uniqueness rules the schema does: provider names are unique, one
//! client per `(provider_id, app_name)`, one directory row per
//! `(provider_id, external_id)`. Repositories cloned off one [`MemoryStore`]
//! share the same tables, so a provider delete cascades to its clients and
//! directory rows exactly as the Postgres backend does.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use alliance_core::{
    AllianceError, Client, ClientId, ClientRepository, DirectoryRepository, ExternalGroup,
    ExternalGroupId, ExternalUser, ExternalUserId, Provider, ProviderId, ProviderRepository,
    Result,
};

type Table<K, V> = Arc<RwLock<HashMap<K, V>>>;

/// Shared backing store for the in-memory repositories
#[derive(Default, Clone)]
pub struct MemoryStore {
    providers: Table<ProviderId, Provider>,
    clients: Table<ClientId, Client>,
    users: Table<ExternalUserId, ExternalUser>,
    groups: Table<ExternalGroupId, ExternalGroup>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn providers(&self) -> MemoryProviderRepository {
        MemoryProviderRepository {
            store: self.clone(),
        }
    }

    pub fn clients(&self) -> MemoryClientRepository {
        MemoryClientRepository {
            store: self.clone(),
        }
    }

    pub fn directory(&self) -> MemoryDirectoryRepository {
        MemoryDirectoryRepository {
            store: self.clone(),
        }
    }
}

pub struct MemoryProviderRepository {
    store: MemoryStore,
}

impl MemoryProviderRepository {
    /// Standalone repository over its own store
    pub fn new() -> Self {
        MemoryStore::new().providers()
    }
}

impl Default for MemoryProviderRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderRepository for MemoryProviderRepository {
    async fn create(&self, provider: &Provider) -> Result<Provider> {
        let mut providers = self.store.providers.write().await;
        if providers.values().any(|p| p.name == provider.name) {
            return Err(AllianceError::database_error(format!(
                "Duplicate provider name: {}",
                provider.name
            )));
        }
        providers.insert(provider.id, provider.clone());
        Ok(provider.clone())
    }

    async fn get(&self, id: ProviderId) -> Result<Option<Provider>> {
        Ok(self.store.providers.read().await.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Provider>> {
        Ok(self
            .store
            .providers
            .read()
            .await
            .values()
            .find(|p| p.name == name)
            .cloned())
    }

    async fn list(&self) -> Result<Vec<Provider>> {
        let mut all: Vec<Provider> = self.store.providers.read().await.values().cloned().collect();
        all.sort_by_key(|p| p.created_at);
        Ok(all)
    }

    async fn list_enabled(&self) -> Result<Vec<Provider>> {
        let mut enabled: Vec<Provider> = self
            .store
            .providers
            .read()
            .await
            .values()
            .filter(|p| p.enabled)
            .cloned()
            .collect();
        enabled.sort_by_key(|p| p.created_at);
        Ok(enabled)
    }

    async fn update(&self, provider: &Provider) -> Result<Provider> {
        let mut providers = self.store.providers.write().await;
        if !providers.contains_key(&provider.id) {
            return Err(AllianceError::not_found("provider", provider.id.to_string()));
        }
        providers.insert(provider.id, provider.clone());
        Ok(provider.clone())
    }

    async fn delete(&self, id: ProviderId) -> Result<()> {
        if self.store.providers.write().await.remove(&id).is_none() {
            return Err(AllianceError::not_found("provider", id.to_string()));
        }

        // Mirror the schema cascade: dependents go with the provider.
        self.store
            .clients
            .write()
            .await
            .retain(|_, c| c.provider_id != id);
        self.store
            .users
            .write()
            .await
            .retain(|_, u| u.provider_id != id);
        self.store
            .groups
            .write()
            .await
            .retain(|_, g| g.provider_id != id);
        Ok(())
    }
}

pub struct MemoryClientRepository {
    store: MemoryStore,
}

impl MemoryClientRepository {
    /// Standalone repository over its own store
    pub fn new() -> Self {
        MemoryStore::new().clients()
    }
}

impl Default for MemoryClientRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ClientRepository for MemoryClientRepository {
    async fn create(&self, client: &Client) -> Result<Client> {
        let mut clients = self.store.clients.write().await;
        if clients
            .values()
            .any(|c| c.provider_id == client.provider_id && c.app_name == client.app_name)
        {
            return Err(AllianceError::database_error(format!(
                "Duplicate client for app: {}",
                client.app_name
            )));
        }
        clients.insert(client.id, client.clone());
        Ok(client.clone())
    }

    async fn get(&self, id: ClientId) -> Result<Option<Client>> {
        Ok(self.store.clients.read().await.get(&id).cloned())
    }

    async fn find_by_app(
        &self,
        provider_id: ProviderId,
        app_name: &str,
    ) -> Result<Option<Client>> {
        Ok(self
            .store
            .clients
            .read()
            .await
            .values()
            .find(|c| c.provider_id == provider_id && c.app_name == app_name)
            .cloned())
    }

    async fn list_by_provider(&self, provider_id: ProviderId) -> Result<Vec<Client>> {
        let mut matching: Vec<Client> = self
            .store
            .clients
            .read()
            .await
            .values()
            .filter(|c| c.provider_id == provider_id)
            .cloned()
            .collect();
        matching.sort_by_key(|c| c.created_at);
        Ok(matching)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.store.clients.read().await.len() as u64)
    }

    async fn update(&self, client: &Client) -> Result<Client> {
        let mut clients = self.store.clients.write().await;
        if !clients.contains_key(&client.id) {
            return Err(AllianceError::ClientNotFound {
                id: client.id.to_string(),
            });
        }
        clients.insert(client.id, client.clone());
        Ok(client.clone())
    }

    async fn delete(&self, id: ClientId) -> Result<()> {
        self.store.clients.write().await.remove(&id);
        Ok(())
    }
}

pub struct MemoryDirectoryRepository {
    store: MemoryStore,
}

impl MemoryDirectoryRepository {
    /// Standalone repository over its own store
    pub fn new() -> Self {
        MemoryStore::new().directory()
    }
}

impl Default for MemoryDirectoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DirectoryRepository for MemoryDirectoryRepository {
    async fn list_users(&self, provider_id: ProviderId) -> Result<Vec<ExternalUser>> {
        let mut matching: Vec<ExternalUser> = self
            .store
            .users
            .read()
            .await
            .values()
            .filter(|u| u.provider_id == provider_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(matching)
    }

    async fn list_all_users(&self) -> Result<Vec<ExternalUser>> {
        let mut all: Vec<ExternalUser> = self.store.users.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(all)
    }

    async fn get_user(&self, id: ExternalUserId) -> Result<Option<ExternalUser>> {
        Ok(self.store.users.read().await.get(&id).cloned())
    }

    async fn get_user_by_external_id(
        &self,
        provider_id: ProviderId,
        external_id: &str,
    ) -> Result<Option<ExternalUser>> {
        Ok(self
            .store
            .users
            .read()
            .await
            .values()
            .find(|u| u.provider_id == provider_id && u.external_id == external_id)
            .cloned())
    }

    async fn insert_user(&self, user: &ExternalUser) -> Result<ExternalUser> {
        let mut users = self.store.users.write().await;
        if users
            .values()
            .any(|u| u.provider_id == user.provider_id && u.external_id == user.external_id)
        {
            return Err(AllianceError::database_error(format!(
                "Duplicate external user: {}",
                user.external_id
            )));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn update_user(&self, user: &ExternalUser) -> Result<ExternalUser> {
        let mut users = self.store.users.write().await;
        if !users.contains_key(&user.id) {
            return Err(AllianceError::not_found("external user", user.id.to_string()));
        }
        users.insert(user.id, user.clone());
        Ok(user.clone())
    }

    async fn delete_user(&self, id: ExternalUserId) -> Result<()> {
        self.store.users.write().await.remove(&id);
        Ok(())
    }

    async fn count_users(&self) -> Result<u64> {
        Ok(self.store.users.read().await.len() as u64)
    }

    async fn list_groups(&self, provider_id: ProviderId) -> Result<Vec<ExternalGroup>> {
        let mut matching: Vec<ExternalGroup> = self
            .store
            .groups
            .read()
            .await
            .values()
            .filter(|g| g.provider_id == provider_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matching)
    }

    async fn get_group(&self, id: ExternalGroupId) -> Result<Option<ExternalGroup>> {
        Ok(self.store.groups.read().await.get(&id).cloned())
    }

    async fn get_group_by_external_id(
        &self,
        provider_id: ProviderId,
        external_id: &str,
    ) -> Result<Option<ExternalGroup>> {
        Ok(self
            .store
            .groups
            .read()
            .await
            .values()
            .find(|g| g.provider_id == provider_id && g.external_id == external_id)
            .cloned())
    }

    async fn insert_group(&self, group: &ExternalGroup) -> Result<ExternalGroup> {
        let mut groups = self.store.groups.write().await;
        if groups
            .values()
            .any(|g| g.provider_id == group.provider_id && g.external_id == group.external_id)
        {
            return Err(AllianceError::database_error(format!(
                "Duplicate external group: {}",
                group.external_id
            )));
        }
        groups.insert(group.id, group.clone());
        Ok(group.clone())
    }

    async fn update_group(&self, group: &ExternalGroup) -> Result<ExternalGroup> {
        let mut groups = self.store.groups.write().await;
        if !groups.contains_key(&group.id) {
            return Err(AllianceError::not_found(
                "external group",
                group.id.to_string(),
            ));
        }
        groups.insert(group.id, group.clone());
        Ok(group.clone())
    }

    async fn delete_group(&self, id: ExternalGroupId) -> Result<()> {
        self.store.groups.write().await.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alliance_core::{
        ClaimMappings, OidcConfig, ProviderConfig, ProviderType, SsoTier,
    };
    use chrono::Utc;

    fn provider(name: &str) -> Provider {
        let now = Utc::now();
        Provider {
            id: ProviderId::new(),
            name: name.to_string(),
            provider_type: ProviderType::Oidc,
            enabled: true,
            is_managed: false,
            container_ref: None,
            config: ProviderConfig::Oidc(OidcConfig {
                issuer_url: "https://idp.example.com".to_string(),
                client_id: "alliance".to_string(),
                client_secret: String::new(),
                authorization_endpoint: None,
                token_endpoint: None,
                userinfo_endpoint: None,
                jwks_uri: None,
                scopes: vec![],
                claim_mappings: ClaimMappings::default(),
            }),
            created_at: now,
            updated_at: now,
        }
    }

    fn client(provider_id: ProviderId, app_name: &str) -> Client {
        let now = Utc::now();
        Client {
            id: ClientId::new(),
            provider_id,
            container_ref: None,
            app_name: app_name.to_string(),
            client_id: "cid".to_string(),
            client_secret_enc: "enc".to_string(),
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            scopes: vec!["openid".to_string()],
            sso_tier: SsoTier::Oidc,
            config: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    fn user(provider_id: ProviderId, external_id: &str) -> ExternalUser {
        let now = Utc::now();
        ExternalUser {
            id: ExternalUserId::new(),
            provider_id,
            external_id: external_id.to_string(),
            username: external_id.to_string(),
            email: format!("{}@example.com", external_id),
            display_name: external_id.to_string(),
            groups: vec![],
            local_user_ref: None,
            last_sync: now,
            created_at: now,
        }
    }

    fn group(provider_id: ProviderId, name: &str) -> ExternalGroup {
        let now = Utc::now();
        ExternalGroup {
            id: ExternalGroupId::new(),
            provider_id,
            external_id: format!("cn={}", name),
            name: name.to_string(),
            description: None,
            local_group_ref: None,
            last_sync: now,
            created_at: now,
        }
    }

    #[tokio::test]
    async fn provider_delete_cascades_to_clients_and_directory() {
        let store = MemoryStore::new();
        let providers = store.providers();
        let clients = store.clients();
        let directory = store.directory();

        let doomed = providers.create(&provider("corp-idp")).await.unwrap();
        let survivor = providers.create(&provider("lab-idp")).await.unwrap();

        clients.create(&client(doomed.id, "nextcloud")).await.unwrap();
        clients.create(&client(survivor.id, "grafana")).await.unwrap();
        directory.insert_user(&user(doomed.id, "alice")).await.unwrap();
        directory.insert_user(&user(survivor.id, "bob")).await.unwrap();
        directory.insert_group(&group(doomed.id, "staff")).await.unwrap();

        providers.delete(doomed.id).await.unwrap();

        assert!(clients.list_by_provider(doomed.id).await.unwrap().is_empty());
        assert!(directory.list_users(doomed.id).await.unwrap().is_empty());
        assert!(directory.list_groups(doomed.id).await.unwrap().is_empty());

        // Unrelated providers keep their rows.
        assert_eq!(clients.list_by_provider(survivor.id).await.unwrap().len(), 1);
        assert_eq!(directory.list_users(survivor.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn standalone_repositories_keep_their_own_tables() {
        let a = MemoryProviderRepository::new();
        let b = MemoryProviderRepository::new();

        a.create(&provider("corp-idp")).await.unwrap();
        assert!(b.find_by_name("corp-idp").await.unwrap().is_none());
    }
}
