//! Alliance SSO - tier resolution and credential injection
//!
//! Maps application images to compatibility profiles, picks the deepest SSO
//! tier both the application and the provider type support, and produces the
//! deployment artifacts (headers, environment, post-deploy commands) the
//! workload manager hands to the application.

pub mod injector;
pub mod profile;
pub mod resolver;

#[cfg(test)]
mod tests;

pub use injector::{CredentialInjector, DeploymentArtifacts, InjectionRequest};
pub use profile::{AppCompatibilityProfile, ProfileCatalog};
pub use resolver::{TierResolver, TierSelection};
