use std::collections::HashSet;
use std::sync::Arc;

use alliance_core::{
    AllianceError, ClaimMappings, LdapConfig, OidcConfig, ProviderConfig, ProviderId,
    ProviderSpec, ProviderType, SecretCipher, SsoTier,
};
use alliance_db::{
    AesGcmSecretCipher, MemoryClientRepository, MemoryProviderRepository, MemoryStore,
};
use serde_json::json;

use crate::clients::{ClientRegistry, ClientSpec};
use crate::common::OidcDiscovery;
use crate::oidc::OidcClient;
use crate::registry::ProviderRegistry;
use crate::state::MemoryStateStore;

fn test_cipher() -> Arc<AesGcmSecretCipher> {
    Arc::new(AesGcmSecretCipher::new(vec![42u8; 32]).unwrap())
}

fn oidc_config() -> OidcConfig {
    OidcConfig {
        issuer_url: "https://idp.example.com".to_string(),
        client_id: "alliance".to_string(),
        client_secret: "s3cret".to_string(),
        authorization_endpoint: None,
        token_endpoint: None,
        userinfo_endpoint: None,
        jwks_uri: None,
        scopes: vec![],
        claim_mappings: ClaimMappings::default(),
    }
}

fn oidc_spec(name: &str) -> ProviderSpec {
    ProviderSpec {
        name: name.to_string(),
        provider_type: ProviderType::Oidc,
        enabled: true,
        is_managed: false,
        container_ref: None,
        config: ProviderConfig::Oidc(oidc_config()),
    }
}

fn test_registry() -> ProviderRegistry {
    ProviderRegistry::new(
        Arc::new(MemoryProviderRepository::new()),
        test_cipher(),
        Arc::new(MemoryStateStore::new()),
        "https://sso.example.com",
    )
}

fn test_discovery() -> OidcDiscovery {
    OidcDiscovery {
        issuer: "https://idp.example.com".to_string(),
        authorization_endpoint: "https://idp.example.com/auth".to_string(),
        token_endpoint: "https://idp.example.com/token".to_string(),
        userinfo_endpoint: Some("https://idp.example.com/userinfo".to_string()),
        jwks_uri: "https://idp.example.com/jwks".to_string(),
        scopes_supported: None,
        id_token_signing_alg_values_supported: None,
    }
}

fn test_oidc_client(config: OidcConfig) -> OidcClient {
    OidcClient::with_discovery(
        ProviderId::new(),
        config,
        "https://sso.example.com/callback".to_string(),
        test_discovery(),
        Arc::new(MemoryStateStore::new()),
    )
    .unwrap()
}

#[test]
fn state_tokens_are_long_and_unique() {
    let mut seen = HashSet::new();
    for _ in 0..100 {
        let state = OidcClient::generate_state();
        // 32 bytes, unpadded URL-safe base64
        assert_eq!(state.len(), 43);
        assert!(!state.contains('+') && !state.contains('/') && !state.contains('='));
        assert!(seen.insert(state));
    }
}

#[tokio::test]
async fn auth_url_carries_registered_state() {
    let client = test_oidc_client(oidc_config());

    let request = client.auth_url(None).await.unwrap();
    assert!(request.url.starts_with("https://idp.example.com/auth?"));
    assert!(request.url.contains("client_id=alliance"));
    assert!(request.url.contains("response_type=code"));
    assert!(request.url.contains(&format!(
        "state={}",
        urlencoding::encode(&request.state)
    )));
    // Default scopes when the config names none
    assert!(request.url.contains("scope=openid%20profile%20email"));
}

#[tokio::test]
async fn auth_url_respects_endpoint_override() {
    let mut config = oidc_config();
    config.authorization_endpoint = Some("https://other.example.com/authorize".to_string());

    let client = test_oidc_client(config);
    let request = client.auth_url(None).await.unwrap();
    assert!(request.url.starts_with("https://other.example.com/authorize?"));
}

#[test]
fn user_info_reads_mapped_claims() {
    let client = test_oidc_client(oidc_config());
    let claims = json!({
        "sub": "abc-123",
        "preferred_username": "jdoe",
        "email": "jdoe@example.com",
        "name": "Jo Doe",
        "groups": ["admins", "staff"],
    });

    let info = client.user_info(claims.as_object().unwrap()).unwrap();
    assert_eq!(info.subject, "abc-123");
    assert_eq!(info.username, "jdoe");
    assert_eq!(info.email, "jdoe@example.com");
    assert_eq!(info.display_name, "Jo Doe");
    assert_eq!(info.groups, vec!["admins", "staff"]);
}

#[test]
fn user_info_username_falls_back_to_email_then_subject() {
    let client = test_oidc_client(oidc_config());

    let claims = json!({ "sub": "abc-123", "email": "jdoe@example.com" });
    let info = client.user_info(claims.as_object().unwrap()).unwrap();
    assert_eq!(info.username, "jdoe@example.com");

    let claims = json!({ "sub": "abc-123" });
    let info = client.user_info(claims.as_object().unwrap()).unwrap();
    assert_eq!(info.username, "abc-123");
}

#[test]
fn user_info_display_name_falls_back_to_name_parts() {
    let client = test_oidc_client(oidc_config());

    let claims = json!({
        "sub": "abc-123",
        "preferred_username": "jdoe",
        "given_name": "Jo",
        "family_name": "Doe",
    });
    let info = client.user_info(claims.as_object().unwrap()).unwrap();
    assert_eq!(info.display_name, "Jo Doe");

    // No name claims at all: fall through to the username
    let claims = json!({ "sub": "abc-123", "preferred_username": "jdoe" });
    let info = client.user_info(claims.as_object().unwrap()).unwrap();
    assert_eq!(info.display_name, "jdoe");
}

#[test]
fn user_info_requires_subject() {
    let client = test_oidc_client(oidc_config());
    let claims = json!({ "preferred_username": "jdoe" });
    assert!(matches!(
        client.user_info(claims.as_object().unwrap()),
        Err(AllianceError::TokenVerificationFailed { .. })
    ));
}

#[test]
fn user_info_honors_custom_claim_mappings() {
    let mut config = oidc_config();
    config.claim_mappings = ClaimMappings {
        username_claim: Some("upn".to_string()),
        email_claim: None,
        groups_claim: Some("roles".to_string()),
        display_name_claim: None,
    };

    let client = test_oidc_client(config);
    let claims = json!({
        "sub": "abc-123",
        "upn": "jdoe@corp.example.com",
        "roles": ["operator"],
    });

    let info = client.user_info(claims.as_object().unwrap()).unwrap();
    assert_eq!(info.username, "jdoe@corp.example.com");
    assert_eq!(info.groups, vec!["operator"]);
}

#[tokio::test]
async fn registry_encrypts_client_secret_at_rest() {
    let cipher = test_cipher();
    let registry = ProviderRegistry::new(
        Arc::new(MemoryProviderRepository::new()),
        Arc::clone(&cipher) as Arc<dyn SecretCipher>,
        Arc::new(MemoryStateStore::new()),
        "https://sso.example.com",
    );

    let provider = registry.create(oidc_spec("corp-idp")).await.unwrap();
    let stored = provider.oidc_config().unwrap();
    assert_ne!(stored.client_secret, "s3cret");
    assert_eq!(cipher.decrypt_b64(&stored.client_secret).unwrap(), "s3cret");
}

#[tokio::test]
async fn registry_rejects_duplicate_names() {
    let registry = test_registry();
    registry.create(oidc_spec("corp-idp")).await.unwrap();

    let err = registry.create(oidc_spec("corp-idp")).await.unwrap_err();
    assert!(matches!(err, AllianceError::InvalidConfig { .. }));
}

#[tokio::test]
async fn registry_rejects_missing_issuer() {
    let registry = test_registry();
    let mut spec = oidc_spec("corp-idp");
    if let ProviderConfig::Oidc(config) = &mut spec.config {
        config.issuer_url = String::new();
    }

    assert!(registry.create(spec).await.is_err());
}

#[tokio::test]
async fn registry_refuses_provider_type_change() {
    let registry = test_registry();
    let provider = registry.create(oidc_spec("corp-idp")).await.unwrap();

    let update = alliance_core::ProviderUpdate {
        config: Some(ProviderConfig::Saml(alliance_core::SamlConfig {
            entity_id: "urn:example".to_string(),
            metadata_url: Some("https://idp.example.com/metadata".to_string()),
            metadata_xml: None,
            sso_url: None,
            certificate: None,
        })),
        ..Default::default()
    };

    let err = registry.update(provider.id, update).await.unwrap_err();
    assert!(matches!(err, AllianceError::InvalidConfig { .. }));
}

#[tokio::test]
async fn registry_blocks_delete_during_login_flow() {
    let registry = test_registry();
    let provider = registry.create(oidc_spec("corp-idp")).await.unwrap();

    let guard = registry.begin_flow(provider.id);
    let err = registry.delete(provider.id).await.unwrap_err();
    assert!(matches!(err, AllianceError::ProviderInUse { .. }));

    // The guard releases the flow on drop, synchronously.
    drop(guard);
    registry.delete(provider.id).await.unwrap();
}

#[tokio::test]
async fn registry_delete_unknown_is_not_found() {
    let registry = test_registry();
    let err = registry.delete(ProviderId::new()).await.unwrap_err();
    assert!(matches!(err, AllianceError::NotFound { .. }));
}

#[tokio::test]
async fn registry_callback_url_shape() {
    let registry = test_registry();
    let id = ProviderId::new();
    assert_eq!(
        registry.callback_url(id),
        format!("https://sso.example.com/providers/{}/callback", id)
    );
}

fn ldap_spec(name: &str) -> ProviderSpec {
    ProviderSpec {
        name: name.to_string(),
        provider_type: ProviderType::Ldap,
        enabled: true,
        is_managed: false,
        container_ref: None,
        config: ProviderConfig::Ldap(LdapConfig {
            // Reserved port; nothing listens here.
            server_url: "ldap://127.0.0.1:1".to_string(),
            base_dn: "dc=example,dc=com".to_string(),
            bind_dn: "cn=admin,dc=example,dc=com".to_string(),
            bind_password: String::new(),
            user_filter: "(objectClass=person)".to_string(),
            group_base_dn: None,
            group_filter: None,
            attribute_mappings: Default::default(),
            start_tls: false,
        }),
    }
}

#[cfg(not(feature = "ldap"))]
#[tokio::test]
async fn ldap_connection_test_reports_missing_support() {
    let registry = test_registry();
    let provider = registry.create(ldap_spec("corp-ldap")).await.unwrap();

    let outcome = registry.test_connection(provider.id).await.unwrap();
    assert!(!outcome.success);
    assert!(outcome.message.contains("ldap feature"));
}

#[cfg(feature = "ldap")]
#[tokio::test]
async fn ldap_connection_test_fails_cleanly_when_unreachable() {
    let registry = test_registry();
    let provider = registry.create(ldap_spec("corp-ldap")).await.unwrap();

    // The bind probe runs for real and must turn a connection failure into
    // a failed test outcome, not an error.
    let outcome = registry.test_connection(provider.id).await.unwrap();
    assert!(!outcome.success);
}

#[tokio::test]
async fn provider_delete_removes_relying_party_clients() {
    let store = MemoryStore::new();
    let cipher = test_cipher();
    let registry = ProviderRegistry::new(
        Arc::new(store.providers()) as Arc<dyn alliance_core::ProviderRepository>,
        Arc::clone(&cipher) as Arc<dyn SecretCipher>,
        Arc::new(MemoryStateStore::new()),
        "https://sso.example.com",
    );
    let clients = ClientRegistry::new(
        Arc::new(store.clients()),
        Arc::new(store.providers()),
        cipher,
    );

    let provider = registry.create(oidc_spec("corp-idp")).await.unwrap();
    clients
        .register(client_spec(provider.id, "nextcloud"))
        .await
        .unwrap();

    registry.delete(provider.id).await.unwrap();
    assert!(clients
        .list_by_provider(provider.id)
        .await
        .unwrap()
        .is_empty());
}

async fn client_fixture() -> (ClientRegistry, ProviderId) {
    let providers = Arc::new(MemoryProviderRepository::new());
    let cipher = test_cipher();
    let registry = ProviderRegistry::new(
        Arc::clone(&providers) as Arc<dyn alliance_core::ProviderRepository>,
        Arc::clone(&cipher) as Arc<dyn SecretCipher>,
        Arc::new(MemoryStateStore::new()),
        "https://sso.example.com",
    );
    let provider = registry.create(oidc_spec("corp-idp")).await.unwrap();

    let clients = ClientRegistry::new(
        Arc::new(MemoryClientRepository::new()),
        providers,
        cipher,
    );
    (clients, provider.id)
}

fn client_spec(provider_id: ProviderId, app: &str) -> ClientSpec {
    ClientSpec {
        provider_id,
        app_name: app.to_string(),
        container_ref: None,
        redirect_uris: vec![format!("https://{}.example.com/callback", app)],
        scopes: vec![],
        sso_tier: SsoTier::Oidc,
        config: serde_json::Value::Null,
    }
}

#[tokio::test]
async fn client_registration_issues_encrypted_credentials() {
    let (clients, provider_id) = client_fixture().await;

    let issued = clients
        .register(client_spec(provider_id, "nextcloud"))
        .await
        .unwrap();

    assert!(!issued.client.client_id.is_empty());
    assert!(!issued.client_secret.is_empty());
    assert_ne!(issued.client.client_secret_enc, issued.client_secret);
    assert_eq!(
        clients.reveal_secret(&issued.client).unwrap(),
        issued.client_secret
    );
    assert_eq!(issued.client.scopes, vec!["openid", "profile", "email"]);
}

#[tokio::test]
async fn client_registration_requires_redirect_uris() {
    let (clients, provider_id) = client_fixture().await;

    let mut spec = client_spec(provider_id, "nextcloud");
    spec.redirect_uris = vec![];
    assert!(clients.register(spec).await.is_err());

    let mut spec = client_spec(provider_id, "nextcloud");
    spec.redirect_uris = vec!["not a url".to_string()];
    assert!(clients.register(spec).await.is_err());
}

#[tokio::test]
async fn client_registration_rejects_duplicate_app() {
    let (clients, provider_id) = client_fixture().await;
    clients
        .register(client_spec(provider_id, "nextcloud"))
        .await
        .unwrap();

    assert!(clients
        .register(client_spec(provider_id, "nextcloud"))
        .await
        .is_err());
}

#[tokio::test]
async fn find_or_register_reuses_existing_without_secret() {
    let (clients, provider_id) = client_fixture().await;

    let (first, secret) = clients
        .find_or_register(client_spec(provider_id, "grafana"))
        .await
        .unwrap();
    assert!(secret.is_some());

    let (second, secret) = clients
        .find_or_register(client_spec(provider_id, "grafana"))
        .await
        .unwrap();
    assert_eq!(first.id, second.id);
    assert!(secret.is_none());
}

#[tokio::test]
async fn rotate_secret_invalidates_old_one() {
    let (clients, provider_id) = client_fixture().await;
    let issued = clients
        .register(client_spec(provider_id, "nextcloud"))
        .await
        .unwrap();

    let rotated = clients.rotate_secret(issued.client.id).await.unwrap();
    assert_ne!(rotated.client_secret, issued.client_secret);
    assert_eq!(
        clients.reveal_secret(&rotated.client).unwrap(),
        rotated.client_secret
    );
}

#[tokio::test]
async fn client_delete_is_idempotent() {
    let (clients, provider_id) = client_fixture().await;
    let issued = clients
        .register(client_spec(provider_id, "nextcloud"))
        .await
        .unwrap();

    clients.delete(issued.client.id).await.unwrap();
    clients.delete(issued.client.id).await.unwrap();
}
