//! SSO tier resolution.

use tracing::debug;

use alliance_core::{Provider, SsoTier};

use crate::profile::{AppCompatibilityProfile, ProfileCatalog};

/// A resolved integration depth for one application image
#[derive(Debug, Clone, Copy)]
pub struct TierSelection<'a> {
    pub profile: &'a AppCompatibilityProfile,
    pub tier: SsoTier,
}

/// Resolves the deepest SSO tier an application and a provider mutually
/// support.
pub struct TierResolver {
    catalog: ProfileCatalog,
}

impl TierResolver {
    pub fn new(catalog: ProfileCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &ProfileCatalog {
        &self.catalog
    }

    /// Match the image against the catalog, intersect the profile's tiers
    /// with what the provider type can satisfy, and pick the maximum.
    ///
    /// `None` means no profile matched or the intersection is empty; the
    /// caller falls back to manual configuration.
    pub fn resolve<'a>(&'a self, image: &str, provider: &Provider) -> Option<TierSelection<'a>> {
        let profile = self.catalog.match_image(image)?;
        let provider_tiers = provider.provider_type.supported_tiers();

        let tier = profile
            .supported_tiers
            .iter()
            .copied()
            .filter(|tier| provider_tiers.contains(tier))
            .max()?;

        debug!(
            app = %profile.app_name,
            %tier,
            provider_type = %provider.provider_type,
            "Resolved SSO tier"
        );
        Some(TierSelection { profile, tier })
    }
}
