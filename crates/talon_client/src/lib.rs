use futures::StreamExt;
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use reqwest::StatusCode;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use talon_auth::scheme::ConnectionScheme;
use talon_core::checksum::checksum;
use talon_core::config::ClientConfig;
use talon_core::error::ConfigError;
use talon_core::manifest::PackManifest;
use talon_core::traits::StatusReporter;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Characters escaped when a file name becomes a URL path segment.
const FILE_NAME_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'\\')
    .add(b'+')
    .add(b'&')
    .add(b'=');

#[derive(Error, Debug)]
pub enum SyncError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned status {0}")]
    Status(StatusCode),

    #[error("failed to parse manifest: {0}")]
    Manifest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },
}

/// Session progress, tracked for diagnostics. Transitions are logged; the
/// only values observable from outside are the final two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Connecting,
    Authenticating,
    ManifestRequested,
    ManifestReceived,
    FileRequested(String),
    FileReceived(String),
    Completed,
    Failed(String),
}

/// What a finished sync attempt resolves to, exactly once. On failure the
/// host proceeds with zero remote files instead of blocking startup.
pub struct SyncOutcome {
    pub success: bool,
    pub manifest: Option<PackManifest>,
}

impl SyncOutcome {
    fn failed() -> Self {
        Self {
            success: false,
            manifest: None,
        }
    }
}

/// Handle to a sync attempt running on its own background task. The caller
/// awaits the outcome; it never performs network I/O itself.
pub struct SyncHandle {
    task: JoinHandle<SyncOutcome>,
}

impl SyncHandle {
    pub async fn wait(self) -> SyncOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("sync task failed unexpectedly: {e}");
                SyncOutcome::failed()
            }
        }
    }
}

/// Client TLS material for the mutual-TLS scheme: the credential bundle
/// (private key + certificate chain PEM) and the CA the server is verified
/// against.
pub struct TlsMaterial {
    pub identity_pem: Vec<u8>,
    pub ca_pem: Vec<u8>,
}

/// One sync attempt: connect, fetch the manifest, then walk its entries in
/// order downloading whatever the local directory does not already have.
pub struct SyncClient {
    config: ClientConfig,
    scheme: Arc<ConnectionScheme>,
    http: reqwest::Client,
    dest_dir: PathBuf,
    status: Arc<dyn StatusReporter>,
    state: SyncState,
}

impl SyncClient {
    pub fn new(
        config: ClientConfig,
        scheme: ConnectionScheme,
        tls: Option<TlsMaterial>,
        dest_dir: impl Into<PathBuf>,
        status: Arc<dyn StatusReporter>,
    ) -> Result<Self, SyncError> {
        config.validate()?;

        let mut builder = reqwest::Client::builder()
            .use_rustls_tls()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs));
        if let Some(tls) = tls {
            let ca = reqwest::Certificate::from_pem(&tls.ca_pem)?;
            let identity = reqwest::Identity::from_pem(&tls.identity_pem)?;
            builder = builder.add_root_certificate(ca).identity(identity);
        }

        Ok(Self {
            config,
            scheme: Arc::new(scheme),
            http: builder.build()?,
            dest_dir: dest_dir.into(),
            status,
            state: SyncState::Idle,
        })
    }

    /// Spawns the whole connect → manifest → file-loop sequence on a
    /// background task and returns immediately.
    pub fn start(self) -> SyncHandle {
        SyncHandle {
            task: tokio::spawn(self.run()),
        }
    }

    async fn run(mut self) -> SyncOutcome {
        let server = self.config.remote_url.clone();
        match self.connect_and_sync().await {
            Ok(manifest) => {
                self.transition(SyncState::Completed);
                info!("pack sync from {server} complete");
                SyncOutcome {
                    success: true,
                    manifest: Some(manifest),
                }
            }
            Err(e) => {
                self.transition(SyncState::Failed(e.to_string()));
                error!("failed to sync pack from {server}: {e}");
                // Surface the underlying cause too; for TLS failures this
                // names the certificate or host that did not match.
                let mut source = std::error::Error::source(&e);
                while let Some(cause) = source {
                    error!("  caused by: {cause}");
                    source = cause.source();
                }
                SyncOutcome::failed()
            }
        }
    }

    async fn connect_and_sync(&mut self) -> Result<PackManifest, SyncError> {
        self.transition(SyncState::Connecting);
        self.transition(SyncState::Authenticating);

        let manifest = self.fetch_manifest().await?;

        // One entry at a time, response fully consumed before the next
        // request. A single failed download is logged and skipped; only
        // connect/auth/manifest failures fail the session.
        for entry in &manifest.entries {
            if self.config.excluded_group_ids.contains(&entry.group_id) {
                debug!("skipping excluded group {}", entry.group_id);
                continue;
            }
            if let Err(e) = self.sync_entry(entry).await {
                warn!(
                    "failed to download {}, continuing with the next file: {e}",
                    entry.file_name
                );
            }
        }

        Ok(manifest)
    }

    async fn fetch_manifest(&mut self) -> Result<PackManifest, SyncError> {
        let url = format!("{}/manifest", self.base_url());
        debug!("requesting server manifest from {url}");
        self.status
            .progress(&format!("Requesting manifest from {}", self.config.remote_url));
        self.transition(SyncState::ManifestRequested);

        let response = self.with_auth(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Status(response.status()));
        }
        let body = response.text().await?;
        let manifest =
            PackManifest::from_json(&body).map_err(|e| SyncError::Manifest(e.to_string()))?;

        self.transition(SyncState::ManifestReceived);
        debug!("received manifest with {} entries", manifest.entries.len());
        Ok(manifest)
    }

    /// Syncs one manifest entry. When the local checksum already matches,
    /// no request is made at all; that skip is the whole point of the
    /// manifest.
    async fn sync_entry(
        &mut self,
        entry: &talon_core::manifest::ManifestEntry,
    ) -> Result<(), SyncError> {
        let dest = self.dest_dir.join(&entry.file_name);
        if checksum(&dest)?.as_deref() == Some(entry.checksum.as_str()) {
            debug!("found existing file {} - skipping", entry.file_name);
            return Ok(());
        }

        self.transition(SyncState::FileRequested(entry.file_name.clone()));
        self.status
            .progress(&format!("Requesting file {}", entry.file_name));
        let encoded = utf8_percent_encode(&entry.file_name, FILE_NAME_ENCODE);
        let url = format!("{}/files/{encoded}", self.base_url());
        debug!("requesting file {}", entry.file_name);

        let response = self.with_auth(self.http.get(&url)).send().await?;
        if !response.status().is_success() {
            return Err(SyncError::Status(response.status()));
        }

        // Stream straight to disk next to the destination, then rename, so
        // an interrupted transfer never leaves a torn file in place.
        let tmp = dest.with_extension("part");
        let mut file = tokio::fs::File::create(&tmp).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);
        tokio::fs::rename(&tmp, &dest).await?;

        let actual = checksum(&dest)?.unwrap_or_default();
        if actual != entry.checksum {
            tokio::fs::remove_file(&dest).await.ok();
            return Err(SyncError::ChecksumMismatch {
                file: entry.file_name.clone(),
                expected: entry.checksum.clone(),
                actual,
            });
        }

        self.transition(SyncState::FileReceived(entry.file_name.clone()));
        Ok(())
    }

    fn with_auth(&self, mut builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        for (name, value) in self.scheme.client_headers() {
            builder = builder.header(name, value);
        }
        builder
    }

    fn base_url(&self) -> &str {
        self.config.remote_url.trim_end_matches('/')
    }

    fn transition(&mut self, next: SyncState) {
        debug!("sync session {:?} -> {next:?}", self.state);
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names_are_url_safe_encoded() {
        let encoded =
            utf8_percent_encode("my mod + extras#1.jar", FILE_NAME_ENCODE).to_string();
        assert_eq!(encoded, "my%20mod%20%2B%20extras%231.jar");
    }

    #[test]
    fn invalid_config_is_rejected_at_construction() {
        let config = ClientConfig::default(); // no remote_url
        let scheme = ConnectionScheme::for_client(
            &ClientConfig {
                remote_url: "http://example".into(),
                password: Some("x".into()),
                ..Default::default()
            },
            None,
            None,
        )
        .unwrap();

        let result = SyncClient::new(
            config,
            scheme,
            None,
            "/tmp/ignored",
            Arc::new(talon_core::traits::NullStatus),
        );
        assert!(matches!(result, Err(SyncError::Config(_))));
    }
}
