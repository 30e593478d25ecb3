//! Federated directory snapshots and reconciliation results

use crate::ids::{ExternalGroupId, ExternalUserId, LocalGroupId, LocalUserId, ProviderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Cached snapshot of a provider's user directory entry.
///
/// `(provider_id, external_id)` is unique. `local_user_ref` is only ever set
/// by an explicit link operation and is never touched by reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalUser {
    pub id: ExternalUserId,
    pub provider_id: ProviderId,
    /// Stable identifier at the provider (OIDC subject, LDAP DN)
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    /// Group names the provider reports for this user
    pub groups: Vec<String>,
    /// Weak reference into the local account store
    pub local_user_ref: Option<LocalUserId>,
    pub last_sync: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Cached snapshot of a provider's group directory entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalGroup {
    pub id: ExternalGroupId,
    pub provider_id: ProviderId,
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
    pub local_group_ref: Option<LocalGroupId>,
    pub last_sync: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Claims extracted from a verified ID token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Token subject; the only mandatory claim
    pub subject: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub groups: Vec<String>,
}

/// A user entry as reported by a provider's bulk directory listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub external_id: String,
    pub username: String,
    pub email: String,
    pub display_name: String,
    pub groups: Vec<String>,
}

/// A group entry as reported by a provider's bulk directory listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryGroup {
    pub external_id: String,
    pub name: String,
    pub description: Option<String>,
}

/// Snapshot of a provider's current directory state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub users: Vec<DirectoryUser>,
    pub groups: Vec<DirectoryGroup>,
}

/// Outcome of one reconciliation pass.
///
/// Always returned when the initial provider fetch succeeds; per-entry
/// failures are carried in `errors` rather than aborting the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResult {
    pub provider_id: ProviderId,
    pub added: u32,
    pub updated: u32,
    pub removed: u32,
    pub errors: Vec<SyncError>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl SyncResult {
    pub fn new(provider_id: ProviderId) -> Self {
        let now = Utc::now();
        Self {
            provider_id,
            added: 0,
            updated: 0,
            removed: 0,
            errors: vec![],
            started_at: now,
            completed_at: now,
        }
    }
}

/// A per-entry reconciliation failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub entity_type: String,
    pub external_id: Option<String>,
    pub message: String,
}
