//! Single-use state tokens for the authorization-code flow.
//!
//! A state token is the CSRF/replay defense for the OIDC callback: issued
//! with the authorization URL, bound to a provider, and consumed exactly
//! once. Consumption is an atomic check-and-delete so two concurrent
//! callbacks presenting the same token never both succeed.
//!
//! The store is a trait so a scaled deployment (callback landing on a
//! different process) can substitute a shared backend; the in-process
//! implementation covers a single-instance deployment.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use alliance_core::{AllianceError, ProviderId, Result};

/// Recommended lifetime for an unconsumed state token
pub const STATE_TTL_SECS: i64 = 600;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Register a freshly issued state token for a provider
    async fn insert(&self, provider_id: ProviderId, token: &str) -> Result<()>;

    /// Atomically consume a token. Fails with `InvalidConfig` when the token
    /// is unknown, expired, bound to a different provider, or already used.
    async fn consume(&self, provider_id: ProviderId, token: &str) -> Result<()>;
}

struct StateEntry {
    provider_id: ProviderId,
    expires_at: DateTime<Utc>,
}

/// In-process state store with TTL expiry
pub struct MemoryStateStore {
    entries: Mutex<HashMap<String, StateEntry>>,
    ttl: Duration,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::seconds(STATE_TTL_SECS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }
}

impl Default for MemoryStateStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn insert(&self, provider_id: ProviderId, token: &str) -> Result<()> {
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        // Opportunistic purge of expired entries
        entries.retain(|_, e| e.expires_at > now);
        entries.insert(
            token.to_string(),
            StateEntry {
                provider_id,
                expires_at: now + self.ttl,
            },
        );
        Ok(())
    }

    async fn consume(&self, provider_id: ProviderId, token: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        match entries.remove(token) {
            Some(entry) if entry.provider_id != provider_id => Err(
                AllianceError::invalid_config("State token bound to a different provider"),
            ),
            Some(entry) if entry.expires_at <= Utc::now() => {
                Err(AllianceError::invalid_config("State token expired"))
            }
            Some(_) => Ok(()),
            None => Err(AllianceError::invalid_config(
                "Unknown or already used state token",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_consume_is_single_use() {
        let store = MemoryStateStore::new();
        let provider_id = ProviderId::new();

        store.insert(provider_id, "tok1").await.unwrap();
        assert!(store.consume(provider_id, "tok1").await.is_ok());
        assert!(store.consume(provider_id, "tok1").await.is_err());
    }

    #[tokio::test]
    async fn test_consume_rejects_unknown_token() {
        let store = MemoryStateStore::new();
        assert!(store.consume(ProviderId::new(), "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_consume_rejects_other_provider() {
        let store = MemoryStateStore::new();
        let provider_id = ProviderId::new();

        store.insert(provider_id, "tok2").await.unwrap();
        assert!(store.consume(ProviderId::new(), "tok2").await.is_err());
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let store = MemoryStateStore::with_ttl(Duration::seconds(-1));
        let provider_id = ProviderId::new();

        store.insert(provider_id, "tok3").await.unwrap();
        assert!(store.consume(provider_id, "tok3").await.is_err());
    }
}
