//! Reconciliation between provider directories and the local cache.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use alliance_core::{
    AllianceError, DirectoryGroup, DirectoryRepository, DirectorySourceResolver, DirectoryUser,
    ExternalGroup, ExternalGroupId, ExternalUser, ExternalUserId, LocalGroupId, LocalUserId,
    ProviderId, ProviderRepository, Result, SyncError, SyncResult, UserInfo,
};

/// Drives `sync`, login upserts, and link/unlink against the directory cache.
///
/// Reconciliation is serialized per provider id; different providers sync in
/// parallel. Login-driven upserts take the same lock only long enough for
/// one keyed write.
pub struct ReconciliationEngine {
    providers: Arc<dyn ProviderRepository>,
    directory: Arc<dyn DirectoryRepository>,
    sources: Arc<dyn DirectorySourceResolver>,
    sync_locks: Mutex<HashMap<ProviderId, Arc<Mutex<()>>>>,
}

impl ReconciliationEngine {
    pub fn new(
        providers: Arc<dyn ProviderRepository>,
        directory: Arc<dyn DirectoryRepository>,
        sources: Arc<dyn DirectorySourceResolver>,
    ) -> Self {
        Self {
            providers,
            directory,
            sources,
            sync_locks: Mutex::new(HashMap::new()),
        }
    }

    async fn provider_lock(&self, provider_id: ProviderId) -> Arc<Mutex<()>> {
        let mut locks = self.sync_locks.lock().await;
        Arc::clone(locks.entry(provider_id).or_default())
    }

    /// Reconcile one provider's directory into the local cache.
    ///
    /// `full_sync` gates removals: entries absent from the listing are only
    /// deleted on a full sync, so partial or paginated provider responses
    /// never shrink the cache. Per-entry failures land in `errors`; only a
    /// failed initial fetch fails the whole call.
    #[instrument(skip(self), fields(provider_id = %provider_id, full_sync))]
    pub async fn sync(&self, provider_id: ProviderId, full_sync: bool) -> Result<SyncResult> {
        let provider = self
            .providers
            .get(provider_id)
            .await?
            .ok_or_else(|| AllianceError::not_found("provider", provider_id.to_string()))?;

        if !provider.enabled {
            return Err(AllianceError::invalid_config(format!(
                "Provider '{}' is disabled",
                provider.name
            )));
        }

        let lock = self.provider_lock(provider_id).await;
        let _guard = lock.lock().await;

        let mut result = SyncResult::new(provider_id);

        let source = match self.sources.source_for(&provider).await? {
            Some(source) => source,
            None => {
                // No bulk listing for this provider type; the cache fills
                // incrementally on login instead.
                debug!("Provider has no directory source; sync is a no-op");
                result.completed_at = Utc::now();
                return Ok(result);
            }
        };

        let listing = source.fetch_directory().await?;
        info!(
            users = listing.users.len(),
            groups = listing.groups.len(),
            "Fetched provider directory"
        );

        self.reconcile_users(provider_id, listing.users, full_sync, &mut result)
            .await;
        self.reconcile_groups(provider_id, listing.groups, full_sync, &mut result)
            .await;

        result.completed_at = Utc::now();
        info!(
            added = result.added,
            updated = result.updated,
            removed = result.removed,
            errors = result.errors.len(),
            "Sync finished"
        );
        Ok(result)
    }

    async fn reconcile_users(
        &self,
        provider_id: ProviderId,
        listing: Vec<DirectoryUser>,
        full_sync: bool,
        result: &mut SyncResult,
    ) {
        let cached = match self.directory.list_users(provider_id).await {
            Ok(users) => users,
            Err(e) => {
                result.errors.push(SyncError {
                    entity_type: "user".to_string(),
                    external_id: None,
                    message: format!("Failed to load cached users: {}", e),
                });
                return;
            }
        };
        let mut cached: HashMap<String, ExternalUser> = cached
            .into_iter()
            .map(|u| (u.external_id.clone(), u))
            .collect();

        let now = Utc::now();

        for entry in listing {
            let outcome = match cached.remove(&entry.external_id) {
                Some(mut existing) => {
                    // Attributes are always rewritten; the local link is
                    // only ever changed by explicit link/unlink.
                    existing.username = entry.username.clone();
                    existing.email = entry.email.clone();
                    existing.display_name = entry.display_name.clone();
                    existing.groups = entry.groups.clone();
                    existing.last_sync = now;
                    self.directory.update_user(&existing).await.map(|_| false)
                }
                None => {
                    let user = ExternalUser {
                        id: ExternalUserId::new(),
                        provider_id,
                        external_id: entry.external_id.clone(),
                        username: entry.username.clone(),
                        email: entry.email.clone(),
                        display_name: entry.display_name.clone(),
                        groups: entry.groups.clone(),
                        local_user_ref: None,
                        last_sync: now,
                        created_at: now,
                    };
                    self.directory.insert_user(&user).await.map(|_| true)
                }
            };

            match outcome {
                Ok(true) => result.added += 1,
                Ok(false) => result.updated += 1,
                Err(e) => result.errors.push(SyncError {
                    entity_type: "user".to_string(),
                    external_id: Some(entry.external_id),
                    message: e.to_string(),
                }),
            }
        }

        // Whatever is left in the cache map was absent from the listing
        if full_sync {
            for (external_id, stale) in cached {
                match self.directory.delete_user(stale.id).await {
                    Ok(()) => result.removed += 1,
                    Err(e) => result.errors.push(SyncError {
                        entity_type: "user".to_string(),
                        external_id: Some(external_id),
                        message: e.to_string(),
                    }),
                }
            }
        }
    }

    async fn reconcile_groups(
        &self,
        provider_id: ProviderId,
        listing: Vec<DirectoryGroup>,
        full_sync: bool,
        result: &mut SyncResult,
    ) {
        let cached = match self.directory.list_groups(provider_id).await {
            Ok(groups) => groups,
            Err(e) => {
                result.errors.push(SyncError {
                    entity_type: "group".to_string(),
                    external_id: None,
                    message: format!("Failed to load cached groups: {}", e),
                });
                return;
            }
        };
        let mut cached: HashMap<String, ExternalGroup> = cached
            .into_iter()
            .map(|g| (g.external_id.clone(), g))
            .collect();

        let now = Utc::now();

        for entry in listing {
            let outcome = match cached.remove(&entry.external_id) {
                Some(mut existing) => {
                    existing.name = entry.name.clone();
                    existing.description = entry.description.clone();
                    existing.last_sync = now;
                    self.directory.update_group(&existing).await.map(|_| false)
                }
                None => {
                    let group = ExternalGroup {
                        id: ExternalGroupId::new(),
                        provider_id,
                        external_id: entry.external_id.clone(),
                        name: entry.name.clone(),
                        description: entry.description.clone(),
                        local_group_ref: None,
                        last_sync: now,
                        created_at: now,
                    };
                    self.directory.insert_group(&group).await.map(|_| true)
                }
            };

            match outcome {
                Ok(true) => result.added += 1,
                Ok(false) => result.updated += 1,
                Err(e) => result.errors.push(SyncError {
                    entity_type: "group".to_string(),
                    external_id: Some(entry.external_id),
                    message: e.to_string(),
                }),
            }
        }

        if full_sync {
            for (external_id, stale) in cached {
                match self.directory.delete_group(stale.id).await {
                    Ok(()) => result.removed += 1,
                    Err(e) => result.errors.push(SyncError {
                        entity_type: "group".to_string(),
                        external_id: Some(external_id),
                        message: e.to_string(),
                    }),
                }
            }
        }
    }

    /// Incremental upsert after a successful OIDC login.
    ///
    /// Keyed by `(provider_id, subject)`; safe to run concurrently across
    /// different users.
    #[instrument(skip(self, info), fields(provider_id = %provider_id, subject = %info.subject))]
    pub async fn upsert_login(
        &self,
        provider_id: ProviderId,
        info: &UserInfo,
    ) -> Result<ExternalUser> {
        let now = Utc::now();

        match self
            .directory
            .get_user_by_external_id(provider_id, &info.subject)
            .await?
        {
            Some(mut existing) => {
                existing.username = info.username.clone();
                existing.email = info.email.clone();
                existing.display_name = info.display_name.clone();
                existing.groups = info.groups.clone();
                existing.last_sync = now;
                self.directory.update_user(&existing).await
            }
            None => {
                let user = ExternalUser {
                    id: ExternalUserId::new(),
                    provider_id,
                    external_id: info.subject.clone(),
                    username: info.username.clone(),
                    email: info.email.clone(),
                    display_name: info.display_name.clone(),
                    groups: info.groups.clone(),
                    local_user_ref: None,
                    last_sync: now,
                    created_at: now,
                };
                debug!("Provisioning directory entry on first login");
                self.directory.insert_user(&user).await
            }
        }
    }

    /// Bind a cached external user to a local account.
    ///
    /// Linking to the already linked id is a no-op; linking to a different id
    /// is a conflict and requires an explicit unlink first.
    #[instrument(skip(self))]
    pub async fn link_user(
        &self,
        id: ExternalUserId,
        local_ref: LocalUserId,
    ) -> Result<ExternalUser> {
        let mut user = self
            .directory
            .get_user(id)
            .await?
            .ok_or_else(|| AllianceError::not_found("external user", id.to_string()))?;

        match user.local_user_ref {
            Some(existing) if existing == local_ref => Ok(user),
            Some(existing) => Err(AllianceError::link_conflict(format!(
                "User {} is already linked to local account {}",
                user.external_id, existing
            ))),
            None => {
                user.local_user_ref = Some(local_ref);
                self.directory.update_user(&user).await
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn unlink_user(&self, id: ExternalUserId) -> Result<ExternalUser> {
        let mut user = self
            .directory
            .get_user(id)
            .await?
            .ok_or_else(|| AllianceError::not_found("external user", id.to_string()))?;

        if user.local_user_ref.take().is_none() {
            warn!(external_id = %user.external_id, "Unlink on a user that was not linked");
        }
        self.directory.update_user(&user).await
    }

    #[instrument(skip(self))]
    pub async fn link_group(
        &self,
        id: ExternalGroupId,
        local_ref: LocalGroupId,
    ) -> Result<ExternalGroup> {
        let mut group = self
            .directory
            .get_group(id)
            .await?
            .ok_or_else(|| AllianceError::not_found("external group", id.to_string()))?;

        match group.local_group_ref {
            Some(existing) if existing == local_ref => Ok(group),
            Some(existing) => Err(AllianceError::link_conflict(format!(
                "Group {} is already linked to local group {}",
                group.external_id, existing
            ))),
            None => {
                group.local_group_ref = Some(local_ref);
                self.directory.update_group(&group).await
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn unlink_group(&self, id: ExternalGroupId) -> Result<ExternalGroup> {
        let mut group = self
            .directory
            .get_group(id)
            .await?
            .ok_or_else(|| AllianceError::not_found("external group", id.to_string()))?;

        group.local_group_ref = None;
        self.directory.update_group(&group).await
    }
}
