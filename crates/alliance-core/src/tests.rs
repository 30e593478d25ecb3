//! Unit tests for alliance-core

use crate::*;
use chrono::Utc;

fn oidc_config() -> ProviderConfig {
    ProviderConfig::Oidc(OidcConfig {
        issuer_url: "https://login.example.com".to_string(),
        client_id: "alliance".to_string(),
        client_secret: "secret".to_string(),
        authorization_endpoint: None,
        token_endpoint: None,
        userinfo_endpoint: None,
        jwks_uri: None,
        scopes: vec![],
        claim_mappings: ClaimMappings::default(),
    })
}

fn provider_with(config: ProviderConfig, provider_type: ProviderType) -> Provider {
    Provider {
        id: ProviderId::new(),
        name: "test".to_string(),
        provider_type,
        enabled: true,
        is_managed: false,
        container_ref: None,
        config,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

mod provider_tests {
    use super::*;

    #[test]
    fn test_provider_type_serialization() {
        for provider_type in [ProviderType::Oidc, ProviderType::Saml, ProviderType::Ldap] {
            let json = serde_json::to_string(&provider_type).unwrap();
            let deserialized: ProviderType = serde_json::from_str(&json).unwrap();
            assert_eq!(deserialized, provider_type);
        }
    }

    #[test]
    fn test_provider_type_display_roundtrip() {
        for provider_type in [ProviderType::Oidc, ProviderType::Saml, ProviderType::Ldap] {
            let parsed: ProviderType = provider_type.to_string().parse().unwrap();
            assert_eq!(parsed, provider_type);
        }
    }

    #[test]
    fn test_config_is_type_tagged() {
        let json = serde_json::to_value(oidc_config()).unwrap();
        assert_eq!(json["type"], "oidc");

        let back: ProviderConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back.provider_type(), ProviderType::Oidc);
    }

    #[test]
    fn test_validate_rejects_mismatched_payload() {
        let provider = provider_with(oidc_config(), ProviderType::Ldap);
        assert!(matches!(
            provider.validate(),
            Err(AllianceError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_validate_requires_oidc_issuer() {
        let config = ProviderConfig::Oidc(OidcConfig {
            issuer_url: "  ".to_string(),
            client_id: "alliance".to_string(),
            client_secret: String::new(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            jwks_uri: None,
            scopes: vec![],
            claim_mappings: ClaimMappings::default(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_saml_metadata() {
        let config = ProviderConfig::Saml(SamlConfig {
            entity_id: "urn:example:idp".to_string(),
            metadata_url: None,
            metadata_xml: None,
            sso_url: None,
            certificate: None,
        });
        assert!(config.validate().is_err());

        let config = ProviderConfig::Saml(SamlConfig {
            entity_id: "urn:example:idp".to_string(),
            metadata_url: Some("https://idp.example.com/metadata".to_string()),
            metadata_xml: None,
            sso_url: None,
            certificate: None,
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_supported_tiers_per_type() {
        assert_eq!(
            ProviderType::Oidc.supported_tiers(),
            &[SsoTier::ForwardAuth, SsoTier::Headers, SsoTier::Oidc]
        );
        assert_eq!(
            ProviderType::Ldap.supported_tiers(),
            &[SsoTier::ForwardAuth, SsoTier::Headers, SsoTier::Ldap]
        );
        assert_eq!(ProviderType::Saml.supported_tiers(), &[SsoTier::ForwardAuth]);
    }
}

mod tier_tests {
    use super::*;

    #[test]
    fn test_tier_ordering() {
        assert!(SsoTier::Ldap > SsoTier::Oidc);
        assert!(SsoTier::Oidc > SsoTier::Headers);
        assert!(SsoTier::Headers > SsoTier::ForwardAuth);
    }

    #[test]
    fn test_tier_numeric_roundtrip() {
        for n in 1..=4 {
            let tier = SsoTier::from_u8(n).unwrap();
            assert_eq!(tier.as_u8(), n);
        }
        assert!(SsoTier::from_u8(5).is_err());
    }
}

mod client_tests {
    use super::*;

    #[test]
    fn test_redirect_uris_must_be_absolute() {
        assert!(Client::validate_redirect_uris(&[]).is_err());
        assert!(
            Client::validate_redirect_uris(&["/relative/callback".to_string()]).is_err()
        );
        assert!(Client::validate_redirect_uris(&[
            "https://app.example.com/oidc/callback".to_string()
        ])
        .is_ok());
    }
}

mod directory_tests {
    use super::*;

    #[test]
    fn test_external_user_serialization() {
        let user = ExternalUser {
            id: ExternalUserId::new(),
            provider_id: ProviderId::new(),
            external_id: "u1".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            display_name: "Alice".to_string(),
            groups: vec!["eng".to_string()],
            local_user_ref: None,
            last_sync: Utc::now(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string(&user).unwrap();
        let back: ExternalUser = serde_json::from_str(&json).unwrap();
        assert_eq!(back.username, user.username);
        assert_eq!(back.groups, user.groups);
        assert!(back.local_user_ref.is_none());
    }

    #[test]
    fn test_sync_result_starts_empty() {
        let result = SyncResult::new(ProviderId::new());
        assert_eq!(result.added, 0);
        assert_eq!(result.updated, 0);
        assert_eq!(result.removed, 0);
        assert!(result.errors.is_empty());
    }
}
