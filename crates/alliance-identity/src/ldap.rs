//! LDAP directory source.
//!
//! Binds with the configured service account and performs subtree searches
//! for users and groups. Compiled only with the `ldap` feature; deployments
//! without it resolve LDAP providers to no directory source.

use async_trait::async_trait;
use ldap3::{LdapConnAsync, LdapConnSettings, Scope, SearchEntry};
use std::sync::Arc;
use tracing::{info, instrument};

use alliance_core::{
    AllianceError, DirectoryGroup, DirectoryListing, DirectorySource, DirectoryUser, LdapConfig,
    Provider, ProviderId, Result, SecretCipher,
};

/// Directory source over one LDAP provider.
///
/// The config carried here still holds the encrypted bind password; it is
/// decrypted per connection and never stored in plaintext.
pub struct LdapDirectory {
    provider_id: ProviderId,
    config: LdapConfig,
    cipher: Arc<dyn SecretCipher>,
}

impl LdapDirectory {
    pub fn new(provider: &Provider, cipher: Arc<dyn SecretCipher>) -> Result<Self> {
        Ok(Self {
            provider_id: provider.id,
            config: provider.ldap_config()?.clone(),
            cipher,
        })
    }

    /// Bind with the service account and disconnect. Connectivity probe.
    pub async fn probe_bind(&self) -> Result<()> {
        let mut ldap = self.connect().await?;
        ldap.unbind().await.ok();
        Ok(())
    }

    async fn connect(&self) -> Result<ldap3::Ldap> {
        let settings = LdapConnSettings::new().set_starttls(self.config.start_tls);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.server_url)
            .await
            .map_err(|e| {
                AllianceError::provider_unreachable(format!("LDAP connection failed: {}", e))
            })?;

        ldap3::drive!(conn);

        let password = if self.config.bind_password.is_empty() {
            String::new()
        } else {
            self.cipher.decrypt_b64(&self.config.bind_password)?
        };

        ldap.simple_bind(&self.config.bind_dn, &password)
            .await
            .map_err(|e| {
                AllianceError::provider_unreachable(format!("LDAP bind failed: {}", e))
            })?
            .success()
            .map_err(|e| {
                AllianceError::provider_unreachable(format!("LDAP bind rejected: {}", e))
            })?;

        Ok(ldap)
    }

    async fn search(
        &self,
        ldap: &mut ldap3::Ldap,
        base: &str,
        filter: &str,
    ) -> Result<Vec<SearchEntry>> {
        let (entries, _result) = ldap
            .search(base, Scope::Subtree, filter, vec!["*"])
            .await
            .map_err(|e| {
                AllianceError::provider_unreachable(format!("LDAP search failed: {}", e))
            })?
            .success()
            .map_err(|e| {
                AllianceError::provider_unreachable(format!("LDAP search failed: {}", e))
            })?;

        Ok(entries.into_iter().map(SearchEntry::construct).collect())
    }

    fn entry_to_user(&self, entry: &SearchEntry) -> Option<DirectoryUser> {
        let mappings = &self.config.attribute_mappings;

        let username = first_attr(entry, &mappings.username)?;
        let email = first_attr(entry, &mappings.email).unwrap_or_default();

        Some(DirectoryUser {
            // The DN is the stable identifier LDAP actually guarantees
            external_id: entry.dn.clone(),
            display_name: mappings
                .display_name
                .as_deref()
                .and_then(|attr| first_attr(entry, attr))
                .unwrap_or_else(|| username.clone()),
            username,
            email,
            groups: mappings
                .member_of
                .as_ref()
                .and_then(|attr| entry.attrs.get(attr))
                .cloned()
                .unwrap_or_default(),
        })
    }

    fn entry_to_group(&self, entry: &SearchEntry) -> Option<DirectoryGroup> {
        let mappings = &self.config.attribute_mappings;

        let name = mappings
            .group_name
            .as_deref()
            .and_then(|attr| first_attr(entry, attr))?;

        Some(DirectoryGroup {
            external_id: entry.dn.clone(),
            name,
            description: mappings
                .group_description
                .as_deref()
                .and_then(|attr| first_attr(entry, attr)),
        })
    }
}

fn first_attr(entry: &SearchEntry, name: &str) -> Option<String> {
    entry.attrs.get(name)?.first().cloned()
}

#[async_trait]
impl DirectorySource for LdapDirectory {
    #[instrument(skip(self), fields(provider_id = %self.provider_id))]
    async fn fetch_directory(&self) -> Result<DirectoryListing> {
        let mut ldap = self.connect().await?;

        let user_entries = self
            .search(&mut ldap, &self.config.base_dn, &self.config.user_filter)
            .await?;
        let users: Vec<DirectoryUser> = user_entries
            .iter()
            .filter_map(|e| self.entry_to_user(e))
            .collect();

        let group_base = self
            .config
            .group_base_dn
            .clone()
            .unwrap_or_else(|| self.config.base_dn.clone());
        let group_filter = self
            .config
            .group_filter
            .as_deref()
            .unwrap_or("(objectClass=groupOfNames)");
        let group_entries = self.search(&mut ldap, &group_base, group_filter).await?;
        let groups: Vec<DirectoryGroup> = group_entries
            .iter()
            .filter_map(|e| self.entry_to_group(e))
            .collect();

        ldap.unbind().await.ok();

        info!(
            users = users.len(),
            groups = groups.len(),
            "Fetched LDAP directory"
        );
        Ok(DirectoryListing { users, groups })
    }
}
