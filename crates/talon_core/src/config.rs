use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Which authentication scheme gates a connection. Selected once at
/// initialization time; both sides must agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SchemeKind {
    /// Shared-secret hash carried as a request header.
    #[default]
    Password,
    /// Transport-level mutual TLS; the peer certificate's common name is the
    /// identity.
    MutualTls,
    /// Out-of-band issued profile key pair signing the session id, with the
    /// key itself countersigned by a trusted external service.
    SignedToken,
}

/// Server-side settings. The host is responsible for producing this struct
/// (from whatever config file format it uses); validation is explicit and
/// happens before anything is initialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub port: u16,
    pub scheme: SchemeKind,

    /// Shared secret, required for [`SchemeKind::Password`].
    pub password: Option<String>,

    /// Canonical server name; subject of the CA root and TLS leaf, and the
    /// name clients verify against.
    pub name: String,

    /// Trust material paths, relative to the managed directory.
    pub ca_key_file: String,
    pub ca_certificate_file: String,
    pub tls_key_file: String,
    pub tls_certificate_file: String,

    /// Trusted external signer key (PEM), required for
    /// [`SchemeKind::SignedToken`].
    pub services_key_file: Option<String>,

    /// Logical group ids the operator opted out of shipping.
    pub excluded_group_ids: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8443,
            scheme: SchemeKind::default(),
            password: None,
            name: "talon-server".to_string(),
            ca_key_file: "ca.key".to_string(),
            ca_certificate_file: "cacert.pem".to_string(),
            tls_key_file: "server.key".to_string(),
            tls_certificate_file: "servercert.pem".to_string(),
            services_key_file: None,
            excluded_group_ids: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Missing("name"));
        }
        match self.scheme {
            SchemeKind::Password if self.password.as_deref().unwrap_or("").is_empty() => {
                Err(ConfigError::Missing("password"))
            }
            SchemeKind::SignedToken if self.services_key_file.is_none() => {
                Err(ConfigError::Missing("services_key_file"))
            }
            _ => Ok(()),
        }
    }
}

/// Client-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the pack server, e.g. `https://pack.example:8443`.
    pub remote_url: String,
    pub scheme: SchemeKind,

    /// Shared secret, required for [`SchemeKind::Password`].
    pub password: Option<String>,

    /// Client credential paths (mutual TLS), relative to the managed
    /// directory.
    pub key_file: String,
    pub certificate_file: String,
    /// CA chain the server is verified against (mutual TLS).
    pub ca_certificate_file: String,

    /// Logical group ids this client refuses to download.
    pub excluded_group_ids: Vec<String>,

    /// Bound on connect + TLS handshake. A session that cannot get this far
    /// fails; there is no implicit retry.
    pub connect_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            remote_url: String::new(),
            scheme: SchemeKind::default(),
            password: None,
            key_file: "client.key".to_string(),
            certificate_file: "clientcert.pem".to_string(),
            ca_certificate_file: "cacert.pem".to_string(),
            excluded_group_ids: Vec::new(),
            connect_timeout_secs: 30,
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.remote_url.is_empty() {
            return Err(ConfigError::Missing("remote_url"));
        }
        if self.scheme == SchemeKind::Password && self.password.as_deref().unwrap_or("").is_empty()
        {
            return Err(ConfigError::Missing("password"));
        }
        Ok(())
    }
}
