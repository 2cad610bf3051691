use thiserror::Error;

/// Configuration problems are fatal at startup: the affected side refuses to
/// initialize rather than run with a partially valid setup.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting `{0}`")]
    Missing(&'static str),

    #[error("invalid value for `{setting}`: {reason}")]
    Invalid {
        setting: &'static str,
        reason: String,
    },
}

/// Authentication/authorization failures. Rejected per request, logged, and
/// never allowed to take the server down.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("missing or malformed authentication material: {0}")]
    Malformed(String),

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("identity `{0}` is not allowed")]
    Forbidden(String),
}

/// Failures reading or writing the manifest document.
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("manifest serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("checksum unavailable for `{0}`")]
    MissingChecksum(String),
}
