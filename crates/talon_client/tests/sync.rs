//! End-to-end sync against a live pack server over plain HTTP.

use axum::Router;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use talon_auth::scheme::ConnectionScheme;
use talon_client::{SyncClient, SyncOutcome};
use talon_core::checksum::checksum;
use talon_core::config::{ClientConfig, ServerConfig};
use talon_core::traits::NullStatus;
use talon_server::PackServer;
use talon_server::files::{CandidateFile, ServerFileManager};
use talon_server::state::AppState;
use tempfile::TempDir;

const PASSWORD: &str = "hunter2";

/// Serves a pack directory on an ephemeral port, counting every file
/// request, and returns the bound address.
async fn spawn_server(server_dir: &Path) -> (SocketAddr, Arc<AtomicUsize>) {
    fs::write(server_dir.join("modA-1.0.jar"), b"old mod contents").unwrap();
    fs::write(server_dir.join("modA-2.0.jar"), b"new mod contents").unwrap();
    fs::write(server_dir.join("pack.zip"), b"resource pack").unwrap();

    let candidates = vec![
        CandidateFile::grouped(server_dir.join("modA-1.0.jar"), "modA", "1.0.0"),
        CandidateFile::grouped(server_dir.join("modA-2.0.jar"), "modA", "2.0.0"),
        CandidateFile::standalone(server_dir.join("pack.zip")),
    ];
    let files = ServerFileManager::initialize(server_dir, &[], &candidates).unwrap();

    let config = ServerConfig {
        password: Some(PASSWORD.into()),
        ..Default::default()
    };
    let scheme = ConnectionScheme::for_server(&config, server_dir).unwrap();
    let state = AppState {
        files,
        scheme: Arc::new(scheme),
        policy: talon_auth::policy::AccessPolicy::new(),
    };

    let file_requests = Arc::new(AtomicUsize::new(0));
    let counter = file_requests.clone();
    let app: Router = PackServer::router(state).layer(axum::middleware::from_fn(
        move |request: axum::extract::Request, next: axum::middleware::Next| {
            let counter = counter.clone();
            async move {
                if request.uri().path().starts_with("/files/") {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                next.run(request).await
            }
        },
    ));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (addr, file_requests)
}

async fn run_sync(addr: SocketAddr, password: &str, dest: &Path) -> SyncOutcome {
    let config = ClientConfig {
        remote_url: format!("http://{addr}"),
        password: Some(password.into()),
        ..Default::default()
    };
    let scheme = ConnectionScheme::for_client(&config, None, None).unwrap();
    let client = SyncClient::new(config, scheme, None, dest, Arc::new(NullStatus)).unwrap();
    client.start().wait().await
}

#[tokio::test]
async fn sync_downloads_changed_files_and_skips_synced_ones() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let (addr, file_requests) = spawn_server(server_dir.path()).await;

    // The client starts with only the outdated version of modA.
    fs::write(client_dir.path().join("modA-1.0.jar"), b"old mod contents").unwrap();

    let outcome = run_sync(addr, PASSWORD, client_dir.path()).await;
    assert!(outcome.success);
    let manifest = outcome.manifest.expect("manifest should be returned");

    // Only the newest version per group shipped.
    assert_eq!(manifest.entries.len(), 2);
    let entry = manifest.entry_for("modA").unwrap();
    assert_eq!(entry.file_name, "modA-2.0.jar");

    // The upgrade arrived with the advertised checksum; the outdated file is
    // left alone (removal is caller policy, not the sync's concern).
    let downloaded = client_dir.path().join("modA-2.0.jar");
    assert_eq!(
        checksum(&downloaded).unwrap().as_deref(),
        Some(entry.checksum.as_str())
    );
    assert!(client_dir.path().join("modA-1.0.jar").exists());
    assert!(client_dir.path().join("pack.zip").exists());
    assert_eq!(file_requests.load(Ordering::SeqCst), 2);

    // Second sync over an already-synced directory: the manifest is the
    // only thing fetched, zero file requests go out.
    let outcome = run_sync(addr, PASSWORD, client_dir.path()).await;
    assert!(outcome.success);
    assert_eq!(file_requests.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn wrong_password_fails_the_sync_without_panicking() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let (addr, file_requests) = spawn_server(server_dir.path()).await;

    let outcome = run_sync(addr, "not-the-password", client_dir.path()).await;

    assert!(!outcome.success);
    assert!(outcome.manifest.is_none());
    assert_eq!(file_requests.load(Ordering::SeqCst), 0);
    assert!(!client_dir.path().join("modA-2.0.jar").exists());
}

#[tokio::test]
async fn unreachable_server_resolves_to_a_failed_outcome() {
    let client_dir = TempDir::new().unwrap();
    let config = ClientConfig {
        // Reserved TEST-NET address; nothing listens there.
        remote_url: "http://192.0.2.1:9".into(),
        password: Some(PASSWORD.into()),
        connect_timeout_secs: 1,
        ..Default::default()
    };
    let scheme = ConnectionScheme::for_client(&config, None, None).unwrap();
    let client =
        SyncClient::new(config, scheme, None, client_dir.path(), Arc::new(NullStatus)).unwrap();

    let outcome = client.start().wait().await;
    assert!(!outcome.success);
}

#[tokio::test]
async fn excluded_groups_are_not_downloaded() {
    let server_dir = TempDir::new().unwrap();
    let client_dir = TempDir::new().unwrap();
    let (addr, _) = spawn_server(server_dir.path()).await;

    let config = ClientConfig {
        remote_url: format!("http://{addr}"),
        password: Some(PASSWORD.into()),
        excluded_group_ids: vec!["modA".into()],
        ..Default::default()
    };
    let scheme = ConnectionScheme::for_client(&config, None, None).unwrap();
    let client =
        SyncClient::new(config, scheme, None, client_dir.path(), Arc::new(NullStatus)).unwrap();
    let outcome = client.start().wait().await;

    assert!(outcome.success);
    assert!(!client_dir.path().join("modA-2.0.jar").exists());
    assert!(client_dir.path().join("pack.zip").exists());
}
