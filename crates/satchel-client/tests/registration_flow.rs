//! End-to-end registration scenarios against a mocked portal server.

use std::sync::Arc;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use satchel_client::{RegistrationConfig, RegistrationFlow, RegistrationState};
use satchel_core::{SatchelError, SigningSchemeKind};
use satchel_identity::{keys, CredentialStore, MemoryCredentialStore, OpenSslCrypto, StoredIdentity};

fn config(server: &MockServer) -> RegistrationConfig {
    RegistrationConfig {
        routing_table_url: format!("{}/routing/table", server.uri()),
        checkin_url: format!("{}/checkin", server.uri()),
        push_register_url: format!("{}/push/register", server.uri()),
        device_name: "test device".into(),
        device_model: "model-x".into(),
    }
}

fn flow(server: &MockServer, store: Arc<MemoryCredentialStore>) -> RegistrationFlow {
    RegistrationFlow::new(config(server), Arc::new(OpenSslCrypto), store)
}

async fn mount_routing(server: &MockServer, table: &str) {
    Mock::given(method("GET"))
        .and(path("/routing/table"))
        .respond_with(ResponseTemplate::new(200).set_body_string(table.to_string()))
        .mount(server)
        .await;
}

async fn mount_push_exchange(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"android_id": 123456, "security_token": 654321}"#,
        ))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/push/register"))
        .respond_with(ResponseTemplate::new(200).set_body_string("token=PUSH-TOKEN-1\n"))
        .mount(server)
        .await;
}

fn seed_old_identity(store: &MemoryCredentialStore) {
    StoredIdentity::Legacy {
        pkcs12_base64: "b2xk".into(),
        credential_token: "old-token".into(),
    }
    .save(store)
    .unwrap();
}

#[tokio::test]
async fn self_signed_registration_replaces_old_identity() {
    let server = MockServer::start().await;
    // routing table sends the device to this same mock server
    mount_routing(&server, &format!("ABC,{}/\n", server.uri())).await;
    mount_push_exchange(&server).await;
    Mock::given(method("POST"))
        .and(path("/powiatwulkanowy/mobile/register/new"))
        .and(body_string_contains("PublicKey"))
        .and(body_string_contains("PUSH-TOKEN-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"IsError": false, "TokenCert": {"UzytkownikNazwa": "Jan K", "CertyfikatDataUtworzenia": 1700000000}}"#,
        ))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    seed_old_identity(&store);

    let mut flow = flow(&server, Arc::clone(&store));
    let scheme = flow
        .login("ABC1234", "powiatwulkanowy", "999", SigningSchemeKind::HttpSignature)
        .await
        .unwrap();

    assert_eq!(flow.state(), RegistrationState::Registered);
    assert_eq!(scheme.kind(), SigningSchemeKind::HttpSignature);

    // exactly one identity afterwards, the old one gone
    assert!(matches!(
        StoredIdentity::load(store.as_ref()).unwrap(),
        Some(StoredIdentity::SelfSigned { .. })
    ));
    assert_eq!(store.get(keys::CERTIFICATE_BUNDLE).unwrap(), None);
    assert_eq!(
        store.get(keys::PUSH_TOKEN).unwrap().as_deref(),
        Some("PUSH-TOKEN-1")
    );
    assert_eq!(
        store.get(keys::ACCOUNT_NAME).unwrap().as_deref(),
        Some("Jan K")
    );
    assert_eq!(
        store.get(keys::BASE_URL).unwrap().as_deref(),
        Some(format!("{}/", server.uri()).as_str())
    );
}

#[tokio::test]
async fn server_error_keeps_previous_identity() {
    let server = MockServer::start().await;
    mount_routing(&server, &format!("ABC,{}/\n", server.uri())).await;
    mount_push_exchange(&server).await;
    Mock::given(method("POST"))
        .and(path("/powiatwulkanowy/mobile/register/new"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(r#"{"IsError": true, "Message": "bad pin"}"#),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    seed_old_identity(&store);

    let mut flow = flow(&server, Arc::clone(&store));
    let err = flow
        .login("ABC1234", "powiatwulkanowy", "000", SigningSchemeKind::HttpSignature)
        .await
        .unwrap_err();

    assert_eq!(flow.state(), RegistrationState::Failed);
    match err {
        SatchelError::ServerError(message) => assert_eq!(message, "bad pin"),
        other => panic!("expected ServerError, got {other:?}"),
    }

    // no new identity stored, and the old one survived the failed attempt
    assert!(matches!(
        StoredIdentity::load(store.as_ref()).unwrap(),
        Some(StoredIdentity::Legacy { .. })
    ));
    assert_eq!(
        store.get(keys::CREDENTIAL_TOKEN).unwrap().as_deref(),
        Some("old-token")
    );
}

#[tokio::test]
async fn unmatched_token_prefix_fails_endpoint_resolution() {
    let server = MockServer::start().await;
    mount_routing(&server, "ABC,https://ep1.example/\n").await;

    let store = Arc::new(MemoryCredentialStore::new());
    seed_old_identity(&store);

    let mut flow = flow(&server, Arc::clone(&store));
    let err = flow
        .login("ZZZ9999", "symbol", "111", SigningSchemeKind::HttpSignature)
        .await
        .unwrap_err();

    assert!(matches!(err, SatchelError::NoEndpointUrl));
    assert_eq!(flow.state(), RegistrationState::Failed);
    // a pre-certificate failure never wipes a valid prior session
    assert!(StoredIdentity::load(store.as_ref()).unwrap().is_some());
}

#[tokio::test]
async fn missing_token_marker_is_no_push_token() {
    let server = MockServer::start().await;
    mount_routing(&server, &format!("ABC,{}/\n", server.uri())).await;
    Mock::given(method("POST"))
        .and(path("/checkin"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"android_id": 1, "security_token": 2}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/push/register"))
        .respond_with(ResponseTemplate::new(200).set_body_string("Error=PHONE_REGISTRATION_ERROR"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let mut flow = flow(&server, Arc::clone(&store));
    let err = flow
        .login("ABC1", "symbol", "111", SigningSchemeKind::HttpSignature)
        .await
        .unwrap_err();

    assert!(matches!(err, SatchelError::NoPushToken));
    assert_eq!(StoredIdentity::load(store.as_ref()).unwrap(), None);
}

#[tokio::test]
async fn routing_table_outage_is_a_transport_error() {
    let server = MockServer::start().await;
    // an error page is not an empty routing table
    Mock::given(method("GET"))
        .and(path("/routing/table"))
        .respond_with(
            ResponseTemplate::new(500).set_body_string("<html>Internal Server Error</html>"),
        )
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    let mut flow = flow(&server, Arc::clone(&store));
    let err = flow
        .login("ABC1234", "symbol", "111", SigningSchemeKind::HttpSignature)
        .await
        .unwrap_err();

    assert!(matches!(err, SatchelError::Http(_)));
    assert!(err.is_retryable());
    assert_eq!(flow.state(), RegistrationState::Failed);
}

#[tokio::test]
async fn register_outage_is_a_transport_error() {
    let server = MockServer::start().await;
    mount_routing(&server, &format!("ABC,{}/\n", server.uri())).await;
    mount_push_exchange(&server).await;
    Mock::given(method("POST"))
        .and(path("/symbol/mobile/register/new"))
        .respond_with(ResponseTemplate::new(503).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let store = Arc::new(MemoryCredentialStore::new());
    seed_old_identity(&store);

    let mut flow = flow(&server, Arc::clone(&store));
    let err = flow
        .login("ABC1234", "symbol", "111", SigningSchemeKind::HttpSignature)
        .await
        .unwrap_err();

    // a 503 is never a decode error, and the prior identity survives
    assert!(matches!(err, SatchelError::Http(_)));
    assert!(err.is_retryable());
    assert!(StoredIdentity::load(store.as_ref()).unwrap().is_some());
}

#[tokio::test]
async fn logout_destroys_all_credential_keys() {
    let server = MockServer::start().await;
    let store = Arc::new(MemoryCredentialStore::new());
    seed_old_identity(&store);
    store.set(keys::PUSH_TOKEN, "push").unwrap();

    let mut flow = flow(&server, Arc::clone(&store));
    flow.logout().unwrap();

    assert_eq!(flow.state(), RegistrationState::Unregistered);
    assert_eq!(StoredIdentity::load(store.as_ref()).unwrap(), None);
    assert_eq!(store.get(keys::PUSH_TOKEN).unwrap(), None);
}
