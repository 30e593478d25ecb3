//! Maps providers to their bulk directory sources.

use async_trait::async_trait;
use std::sync::Arc;

use alliance_core::{DirectorySource, DirectorySourceResolver, Provider, Result, SecretCipher};

/// Default resolver: LDAP providers get a live directory source when the
/// `ldap` feature is compiled in; OIDC and SAML expose no bulk listing, so
/// reconciliation is a no-op for them.
pub struct DefaultSourceResolver {
    #[cfg_attr(not(feature = "ldap"), allow(dead_code))]
    cipher: Arc<dyn SecretCipher>,
}

impl DefaultSourceResolver {
    pub fn new(cipher: Arc<dyn SecretCipher>) -> Self {
        Self { cipher }
    }
}

#[async_trait]
impl DirectorySourceResolver for DefaultSourceResolver {
    async fn source_for(&self, provider: &Provider) -> Result<Option<Arc<dyn DirectorySource>>> {
        match provider.provider_type {
            #[cfg(feature = "ldap")]
            alliance_core::ProviderType::Ldap => {
                let source = crate::ldap::LdapDirectory::new(provider, Arc::clone(&self.cipher))?;
                Ok(Some(Arc::new(source)))
            }
            _ => Ok(None),
        }
    }
}
