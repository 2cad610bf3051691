//! Mutual-TLS end to end: a CA-issued client certificate gets the manifest,
//! a peer off the allow-list is cut before any request is answered.

use std::fs;
use std::sync::Arc;
use talon_auth::policy::AccessPolicy;
use talon_auth::scheme::ConnectionScheme;
use talon_core::config::{SchemeKind, ServerConfig};
use talon_pki::csr::Csr;
use talon_pki::identity::ServerIdentity;
use talon_pki::keys::KeyPair;
use talon_server::files::{CandidateFile, ServerFileManager};
use talon_server::state::AppState;
use talon_server::{PackServer, tls};
use tempfile::TempDir;
use uuid::Uuid;

struct TlsFixture {
    port: u16,
    ca_pem: Vec<u8>,
    client_identity_pem: Vec<u8>,
    policy: AccessPolicy,
    client_id: String,
}

async fn spawn_tls_server() -> TlsFixture {
    let server_dir = TempDir::new().unwrap();
    let config = ServerConfig {
        scheme: SchemeKind::MutualTls,
        name: "localhost".into(),
        ..Default::default()
    };
    let identity = ServerIdentity::load_or_create(server_dir.path(), &config).unwrap();

    // Issue a client credential the way the offline signing flow would.
    let client_id = Uuid::new_v4().to_string();
    let client_key = KeyPair::generate().unwrap();
    let csr = Csr::generate(&client_id, &client_key).unwrap();
    let leaf = identity.issue_client_certificate(&csr).unwrap();

    let mut client_identity_pem = client_key.private_key_pem().unwrap();
    client_identity_pem.extend_from_slice(&leaf.to_pem().unwrap());
    client_identity_pem.extend_from_slice(&identity.ca_cert().to_pem().unwrap());
    let ca_pem = identity.ca_cert().to_pem().unwrap();

    let policy = AccessPolicy::new();
    policy.replace_allowed([client_id.clone()]);
    policy.set_enabled(true);

    fs::write(server_dir.path().join("pack.zip"), b"resource pack").unwrap();
    let files = ServerFileManager::initialize(
        server_dir.path(),
        &[],
        &[CandidateFile::standalone(server_dir.path().join("pack.zip"))],
    )
    .unwrap();

    let state = AppState {
        files,
        scheme: Arc::new(ConnectionScheme::MutualTls),
        policy: policy.clone(),
    };
    let router = PackServer::router(state);
    let acceptor = tls::acceptor(&identity).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let serve_policy = policy.clone();
    tokio::spawn(async move {
        tls::serve_mutual_tls(listener, acceptor, router, serve_policy)
            .await
            .unwrap();
    });

    // Keep the managed directory alive for the duration of the test task.
    std::mem::forget(server_dir);

    TlsFixture {
        port,
        ca_pem,
        client_identity_pem,
        policy,
        client_id,
    }
}

fn tls_client(fixture: &TlsFixture) -> reqwest::Client {
    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(&fixture.ca_pem).unwrap())
        .identity(reqwest::Identity::from_pem(&fixture.client_identity_pem).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn whitelisted_peer_certificate_is_served() {
    let fixture = spawn_tls_server().await;
    let client = tls_client(&fixture);

    let response = client
        .get(format!("https://localhost:{}/manifest", fixture.port))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let manifest: serde_json::Value = response.json().await.unwrap();
    assert_eq!(manifest["entries"][0]["fileName"], "pack.zip");
}

#[tokio::test]
async fn peer_off_the_allow_list_is_disconnected_before_any_response() {
    let fixture = spawn_tls_server().await;
    let client = tls_client(&fixture);

    // Same valid certificate, but the policy no longer lists it: the server
    // closes the connection right after the handshake.
    fixture.policy.replace_allowed(["someone-else".to_string()]);
    assert!(!fixture.policy.is_allowed(&fixture.client_id));

    let result = client
        .get(format!("https://localhost:{}/manifest", fixture.port))
        .send()
        .await;

    assert!(result.is_err());
}
