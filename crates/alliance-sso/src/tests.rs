use std::collections::HashMap;
use std::sync::Arc;

use alliance_core::{
    AllianceError, ClaimMappings, LdapAttributeMappings, LdapConfig, OidcConfig, Provider,
    ProviderConfig, ProviderId, ProviderRepository, ProviderType, SecretCipher, SsoTier,
};
use alliance_db::{AesGcmSecretCipher, MemoryClientRepository, MemoryProviderRepository};
use alliance_identity::ClientRegistry;
use chrono::Utc;

use crate::injector::{CredentialInjector, InjectionRequest};
use crate::profile::{AppCompatibilityProfile, ProfileCatalog};
use crate::resolver::TierResolver;

fn profile(
    app: &str,
    pattern: &str,
    tiers: Vec<SsoTier>,
) -> AppCompatibilityProfile {
    AppCompatibilityProfile {
        app_name: app.to_string(),
        pattern: pattern.to_string(),
        supported_tiers: tiers,
        headers: HashMap::new(),
        env: HashMap::new(),
        post_deploy_commands: Vec::new(),
    }
}

fn oidc_provider(cipher: &AesGcmSecretCipher) -> Provider {
    let now = Utc::now();
    Provider {
        id: ProviderId::new(),
        name: "corp-idp".to_string(),
        provider_type: ProviderType::Oidc,
        enabled: true,
        is_managed: false,
        container_ref: None,
        config: ProviderConfig::Oidc(OidcConfig {
            issuer_url: "https://idp.example.com".to_string(),
            client_id: "alliance".to_string(),
            client_secret: cipher.encrypt_b64("idp-secret").unwrap(),
            authorization_endpoint: None,
            token_endpoint: None,
            userinfo_endpoint: None,
            jwks_uri: None,
            scopes: vec![],
            claim_mappings: ClaimMappings::default(),
        }),
        created_at: now,
        updated_at: now,
    }
}

fn ldap_provider(cipher: &AesGcmSecretCipher) -> Provider {
    let now = Utc::now();
    Provider {
        id: ProviderId::new(),
        name: "corp-ldap".to_string(),
        provider_type: ProviderType::Ldap,
        enabled: true,
        is_managed: true,
        container_ref: Some("workload-7".to_string()),
        config: ProviderConfig::Ldap(LdapConfig {
            server_url: "ldaps://ldap.example.com:636".to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: "cn=svc,dc=example,dc=com".to_string(),
            bind_password: cipher.encrypt_b64("ldap-pass").unwrap(),
            user_filter: "(objectClass=person)".to_string(),
            group_base_dn: None,
            group_filter: None,
            attribute_mappings: LdapAttributeMappings::default(),
            start_tls: false,
        }),
        created_at: now,
        updated_at: now,
    }
}

struct Fixture {
    cipher: Arc<AesGcmSecretCipher>,
    providers: Arc<MemoryProviderRepository>,
    clients: Arc<ClientRegistry>,
    injector: CredentialInjector,
}

fn fixture() -> Fixture {
    let cipher = Arc::new(AesGcmSecretCipher::new(vec![9u8; 32]).unwrap());
    let providers = Arc::new(MemoryProviderRepository::new());
    let clients = Arc::new(ClientRegistry::new(
        Arc::new(MemoryClientRepository::new()),
        Arc::clone(&providers) as Arc<dyn ProviderRepository>,
        Arc::clone(&cipher) as Arc<dyn SecretCipher>,
    ));
    let injector = CredentialInjector::new(
        Arc::clone(&clients),
        Arc::clone(&cipher) as Arc<dyn SecretCipher>,
    );
    Fixture {
        cipher,
        providers,
        clients,
        injector,
    }
}

#[test]
fn catalog_first_match_wins() {
    let catalog = ProfileCatalog::from_profiles(vec![
        profile("nextcloud", "^nextcloud", vec![SsoTier::Oidc]),
        profile("nextcloud-fpm", "^nextcloud:fpm", vec![SsoTier::Headers]),
    ])
    .unwrap();

    // Both patterns match; the first configured profile takes the image
    let matched = catalog.match_image("nextcloud:fpm-29").unwrap();
    assert_eq!(matched.app_name, "nextcloud");

    assert!(catalog.match_image("grafana:11").is_none());
}

#[test]
fn catalog_rejects_bad_pattern() {
    let mut catalog = ProfileCatalog::new();
    let err = catalog
        .push(profile("broken", "^(unclosed", vec![SsoTier::ForwardAuth]))
        .unwrap_err();
    assert!(matches!(err, AllianceError::InvalidConfig { .. }));
}

#[test]
fn resolver_picks_highest_mutual_tier() {
    let fx = fixture();
    let provider = oidc_provider(&fx.cipher);

    let resolver = TierResolver::new(
        ProfileCatalog::from_profiles(vec![profile(
            "nextcloud",
            "^nextcloud",
            vec![SsoTier::Headers, SsoTier::Oidc],
        )])
        .unwrap(),
    );

    let selection = resolver.resolve("nextcloud:29", &provider).unwrap();
    assert_eq!(selection.tier, SsoTier::Oidc);
}

#[test]
fn resolver_honors_provider_type_capabilities() {
    let fx = fixture();
    let ldap = ldap_provider(&fx.cipher);

    let resolver = TierResolver::new(
        ProfileCatalog::from_profiles(vec![profile(
            "openldap-app",
            "^legacy-app",
            vec![SsoTier::Headers, SsoTier::Oidc, SsoTier::Ldap],
        )])
        .unwrap(),
    );

    // LDAP providers cannot satisfy tier 3; tier 4 is the deepest mutual one
    let selection = resolver.resolve("legacy-app:1.0", &ldap).unwrap();
    assert_eq!(selection.tier, SsoTier::Ldap);
}

#[test]
fn resolver_returns_none_on_empty_intersection() {
    let fx = fixture();
    let mut saml = oidc_provider(&fx.cipher);
    saml.provider_type = ProviderType::Saml;

    let resolver = TierResolver::new(
        ProfileCatalog::from_profiles(vec![profile(
            "nextcloud",
            "^nextcloud",
            vec![SsoTier::Headers, SsoTier::Oidc],
        )])
        .unwrap(),
    );

    assert!(resolver.resolve("nextcloud:29", &saml).is_none());
    assert!(resolver.resolve("unknown-image:1", &saml).is_none());
}

#[tokio::test]
async fn forward_auth_produces_empty_artifacts() {
    let fx = fixture();
    let provider = oidc_provider(&fx.cipher);
    let p = profile("whoami", "^whoami", vec![SsoTier::ForwardAuth]);

    let artifacts = fx
        .injector
        .inject(InjectionRequest {
            provider: &provider,
            profile: &p,
            tier: SsoTier::ForwardAuth,
            container_ref: None,
            redirect_uris: vec![],
        })
        .await
        .unwrap();

    assert!(artifacts.headers.is_empty());
    assert!(artifacts.env.is_empty());
    assert!(artifacts.post_deploy_commands.is_empty());
}

#[tokio::test]
async fn injection_rejects_disabled_provider() {
    let fx = fixture();
    let mut provider = oidc_provider(&fx.cipher);
    provider.enabled = false;
    let p = profile("whoami", "^whoami", vec![SsoTier::ForwardAuth]);

    let err = fx
        .injector
        .inject(InjectionRequest {
            provider: &provider,
            profile: &p,
            tier: SsoTier::ForwardAuth,
            container_ref: None,
            redirect_uris: vec![],
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AllianceError::InvalidConfig { .. }));
}

#[tokio::test]
async fn headers_tier_passes_templates_verbatim() {
    let fx = fixture();
    let provider = oidc_provider(&fx.cipher);

    let mut p = profile("dashboard", "^dashboard", vec![SsoTier::Headers]);
    p.headers
        .insert("Remote-User".to_string(), "preferred_username".to_string());
    p.headers.insert("Remote-Email".to_string(), "email".to_string());
    p.env
        .insert("AUTH_PROXY".to_string(), "enabled".to_string());

    let artifacts = fx
        .injector
        .inject(InjectionRequest {
            provider: &provider,
            profile: &p,
            tier: SsoTier::Headers,
            container_ref: None,
            redirect_uris: vec![],
        })
        .await
        .unwrap();

    assert_eq!(
        artifacts.headers.get("Remote-User").map(String::as_str),
        Some("preferred_username")
    );
    assert_eq!(
        artifacts.env.get("AUTH_PROXY").map(String::as_str),
        Some("enabled")
    );
}

#[tokio::test]
async fn oidc_tier_registers_client_and_substitutes_placeholders() {
    let fx = fixture();
    let provider = oidc_provider(&fx.cipher);
    fx.providers.create(&provider).await.unwrap();

    let mut p = profile("nextcloud", "^nextcloud", vec![SsoTier::Oidc]);
    p.env.insert(
        "OIDC_ISSUER".to_string(),
        "${ALLIANCE_ISSUER}".to_string(),
    );
    p.env.insert(
        "OIDC_CLIENT_ID".to_string(),
        "${ALLIANCE_CLIENT_ID}".to_string(),
    );
    p.env.insert(
        "OIDC_CLIENT_SECRET".to_string(),
        "${ALLIANCE_CLIENT_SECRET}".to_string(),
    );
    p.env.insert(
        "OIDC_REDIRECT".to_string(),
        "${ALLIANCE_CALLBACK_URL}/redirect".to_string(),
    );
    p.env.insert(
        "MYSTERY".to_string(),
        "${ALLIANCE_UNKNOWN}".to_string(),
    );
    p.post_deploy_commands
        .push("occ app:enable oidc_login".to_string());

    let artifacts = fx
        .injector
        .inject(InjectionRequest {
            provider: &provider,
            profile: &p,
            tier: SsoTier::Oidc,
            container_ref: Some("workload-3".to_string()),
            redirect_uris: vec!["https://cloud.example.com/callback".to_string()],
        })
        .await
        .unwrap();

    assert_eq!(
        artifacts.env.get("OIDC_ISSUER").map(String::as_str),
        Some("https://idp.example.com")
    );
    assert_eq!(
        artifacts.env.get("OIDC_REDIRECT").map(String::as_str),
        Some("https://cloud.example.com/callback/redirect")
    );
    // Unknown placeholders pass through literally
    assert_eq!(
        artifacts.env.get("MYSTERY").map(String::as_str),
        Some("${ALLIANCE_UNKNOWN}")
    );
    assert_eq!(
        artifacts.post_deploy_commands,
        vec!["occ app:enable oidc_login"]
    );

    // A client now exists, and the injected credentials match it
    let registered = fx
        .clients
        .list_by_provider(provider.id)
        .await
        .unwrap();
    assert_eq!(registered.len(), 1);
    assert_eq!(
        artifacts.env.get("OIDC_CLIENT_ID"),
        Some(&registered[0].client_id)
    );
    assert_eq!(
        artifacts.env.get("OIDC_CLIENT_SECRET").map(String::as_str),
        Some(fx.clients.reveal_secret(&registered[0]).unwrap().as_str())
    );
}

#[tokio::test]
async fn oidc_tier_reuses_existing_client() {
    let fx = fixture();
    let provider = oidc_provider(&fx.cipher);
    fx.providers.create(&provider).await.unwrap();

    let p = profile("nextcloud", "^nextcloud", vec![SsoTier::Oidc]);
    let request = || InjectionRequest {
        provider: &provider,
        profile: &p,
        tier: SsoTier::Oidc,
        container_ref: None,
        redirect_uris: vec!["https://cloud.example.com/callback".to_string()],
    };

    fx.injector.inject(request()).await.unwrap();
    fx.injector.inject(request()).await.unwrap();

    assert_eq!(fx.clients.count().await.unwrap(), 1);
}

#[tokio::test]
async fn ldap_tier_emits_decrypted_connection_env() {
    let fx = fixture();
    let provider = ldap_provider(&fx.cipher);
    let p = profile("legacy-app", "^legacy-app", vec![SsoTier::Ldap]);

    let artifacts = fx
        .injector
        .inject(InjectionRequest {
            provider: &provider,
            profile: &p,
            tier: SsoTier::Ldap,
            container_ref: None,
            redirect_uris: vec![],
        })
        .await
        .unwrap();

    assert_eq!(
        artifacts.env.get("ALLIANCE_LDAP_SERVER_URL").map(String::as_str),
        Some("ldaps://ldap.example.com:636")
    );
    assert_eq!(
        artifacts.env.get("ALLIANCE_LDAP_BASE_DN").map(String::as_str),
        Some("dc=example,dc=com")
    );
    assert_eq!(
        artifacts.env.get("ALLIANCE_LDAP_BIND_PASSWORD").map(String::as_str),
        Some("ldap-pass")
    );

    // No relying-party client is created at tier 4
    assert_eq!(fx.clients.count().await.unwrap(), 0);
}
