//! Application compatibility profiles.
//!
//! Read-only reference data describing which SSO tiers an application image
//! supports and the tier-specific templates to apply at injection time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use alliance_core::{AllianceError, Result, SsoTier};

/// Static knowledge about one application family.
///
/// `pattern` is matched against the image identifier (`repository:tag`).
/// Environment values may carry `${ALLIANCE_*}` placeholders resolved by the
/// injector at tier 3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppCompatibilityProfile {
    pub app_name: String,
    /// Regex over the image identifier
    pub pattern: String,
    pub supported_tiers: Vec<SsoTier>,
    /// Header name -> claim name, injected at tier 2
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Environment templates, verbatim at tier 2, substituted at tier 3
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// One-shot commands the workload manager runs after a tier-3 deploy
    #[serde(default)]
    pub post_deploy_commands: Vec<String>,
}

struct CatalogEntry {
    profile: AppCompatibilityProfile,
    regex: Regex,
}

/// Ordered profile lookup table.
///
/// Profiles are tried in insertion order and the first pattern match wins;
/// when two patterns overlap, whichever the operator configured first takes
/// the image.
#[derive(Default)]
pub struct ProfileCatalog {
    entries: Vec<CatalogEntry>,
}

impl ProfileCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a catalog preserving the given order
    pub fn from_profiles(profiles: Vec<AppCompatibilityProfile>) -> Result<Self> {
        let mut catalog = Self::new();
        for profile in profiles {
            catalog.push(profile)?;
        }
        Ok(catalog)
    }

    /// Append a profile; fails on an invalid pattern
    pub fn push(&mut self, profile: AppCompatibilityProfile) -> Result<()> {
        let regex = Regex::new(&profile.pattern).map_err(|e| {
            AllianceError::invalid_config(format!(
                "Bad pattern for profile '{}': {}",
                profile.app_name, e
            ))
        })?;
        self.entries.push(CatalogEntry { profile, regex });
        Ok(())
    }

    /// First profile whose pattern matches the image identifier
    pub fn match_image(&self, image: &str) -> Option<&AppCompatibilityProfile> {
        self.entries
            .iter()
            .find(|entry| entry.regex.is_match(image))
            .map(|entry| &entry.profile)
    }

    /// Profiles in match order
    pub fn profiles(&self) -> impl Iterator<Item = &AppCompatibilityProfile> {
        self.entries.iter().map(|entry| &entry.profile)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
