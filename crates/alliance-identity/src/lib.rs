//! Alliance Identity - provider lifecycle and the OIDC protocol client
//!
//! This crate drives the federation side of the engine:
//! - `ProviderRegistry`: provider CRUD with validation, secret encryption,
//!   cascade delete, and the cached per-provider protocol clients
//! - `OidcClient`: discovery, authorization URLs, code exchange, ID-token
//!   verification, claim extraction, refresh
//! - `StateStore`: single-use CSRF state tokens with TTL
//! - `ClientRegistry`: relying-party registrations for tier-3 applications
//!
//! LDAP directory listing (used by reconciliation) is behind the `ldap`
//! feature; SAML providers are modeled and probed but carry no wire protocol.

pub mod clients;
pub mod common;
pub mod oidc;
pub mod registry;
pub mod sources;
pub mod state;

#[cfg(feature = "ldap")]
pub mod ldap;

#[cfg(test)]
mod tests;

pub use clients::{ClientRegistry, ClientSpec, IssuedClient};
pub use common::{HttpClient, JwksCache, OidcDiscovery, TokenSet};
pub use oidc::{AuthorizationRequest, OidcClient};
pub use registry::{ConnectionTest, FlowGuard, ProviderRegistry};
pub use sources::DefaultSourceResolver;
pub use state::{MemoryStateStore, StateStore};
