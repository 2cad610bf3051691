use crate::password::PasswordScheme;
use crate::policy::AccessPolicy;
use crate::session_token::{ProfileCredential, SignedTokenScheme};
use http::HeaderMap;
use std::fs;
use std::path::Path;
use talon_core::config::{ClientConfig, SchemeKind, ServerConfig};
use talon_core::error::ConfigError;
use uuid::Uuid;

pub const AUTHENTICATION: &str = "Authentication";
pub const AUTHENTICATION_ID: &str = "AuthenticationId";
pub const AUTHENTICATION_SIGNATURE: &str = "AuthenticationSignature";
pub const AUTHENTICATION_KEY: &str = "AuthenticationKey";
pub const AUTHENTICATION_KEY_EXPIRE: &str = "AuthenticationKeyExpire";
pub const AUTHENTICATION_KEY_SIGNATURE: &str = "AuthenticationKeySignature";

/// Per-connection credential exchange and verification.
pub trait AuthScheme: Send + Sync + 'static {
    /// Headers the client attaches to every request. May be empty when no
    /// credential is available; the client then proceeds and expects
    /// server-side rejection instead of crashing.
    fn client_headers(&self) -> Vec<(&'static str, String)>;

    /// Server-side gate for one request. A `false` here must be answered
    /// exactly like a missing file, never distinguished on the wire.
    fn authorize(&self, headers: &HeaderMap, policy: &AccessPolicy) -> bool;
}

/// The scheme actually gating this deployment, selected once from
/// configuration. Mutual TLS carries no request headers: its authorization
/// happens at the TLS accept layer, where the peer certificate's common name
/// is checked against the access policy before any request is served.
pub enum ConnectionScheme {
    Password(PasswordScheme),
    MutualTls,
    SignedToken(SignedTokenScheme),
}

impl ConnectionScheme {
    /// Builds the server half. `dir` is the managed directory trust-material
    /// paths are resolved against.
    pub fn for_server(config: &ServerConfig, dir: &Path) -> Result<Self, ConfigError> {
        config.validate()?;
        match config.scheme {
            SchemeKind::Password => Ok(Self::Password(PasswordScheme::new(
                config.password.as_deref().unwrap_or_default(),
            ))),
            SchemeKind::MutualTls => Ok(Self::MutualTls),
            SchemeKind::SignedToken => {
                let key_file = config
                    .services_key_file
                    .as_deref()
                    .ok_or(ConfigError::Missing("services_key_file"))?;
                let pem =
                    fs::read(dir.join(key_file)).map_err(|e| ConfigError::Invalid {
                        setting: "services_key_file",
                        reason: e.to_string(),
                    })?;
                Ok(Self::SignedToken(SignedTokenScheme::for_server(&pem)?))
            }
        }
    }

    /// Builds the client half. `session_id` and `credential` are supplied by
    /// the host; only the signed-token scheme consults them.
    pub fn for_client(
        config: &ClientConfig,
        session_id: Option<Uuid>,
        credential: Option<ProfileCredential>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        match config.scheme {
            SchemeKind::Password => Ok(Self::Password(PasswordScheme::new(
                config.password.as_deref().unwrap_or_default(),
            ))),
            SchemeKind::MutualTls => Ok(Self::MutualTls),
            SchemeKind::SignedToken => Ok(Self::SignedToken(SignedTokenScheme::for_client(
                session_id, credential,
            )?)),
        }
    }

    pub fn kind(&self) -> SchemeKind {
        match self {
            Self::Password(_) => SchemeKind::Password,
            Self::MutualTls => SchemeKind::MutualTls,
            Self::SignedToken(_) => SchemeKind::SignedToken,
        }
    }

    pub fn client_headers(&self) -> Vec<(&'static str, String)> {
        match self {
            Self::Password(scheme) => scheme.client_headers(),
            Self::MutualTls => Vec::new(),
            Self::SignedToken(scheme) => scheme.client_headers(),
        }
    }

    pub fn authorize(&self, headers: &HeaderMap, policy: &AccessPolicy) -> bool {
        match self {
            Self::Password(scheme) => scheme.authorize(headers, policy),
            // Gated at the handshake; a connection that got this far already
            // passed the policy check.
            Self::MutualTls => true,
            Self::SignedToken(scheme) => scheme.authorize(headers, policy),
        }
    }
}
