use std::path::PathBuf;
use thiserror::Error;

/// Failures handling key or certificate material.
///
/// All of these are fatal at the call site: there is no degraded mode for
/// authentication material, and silently regenerating trust material would
/// desynchronize every certificate already issued from it.
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("cryptographic provider failure: {0}")]
    Provider(#[from] openssl::error::ErrorStack),

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyChain(PathBuf),

    #[error("certificate subject `{found}` does not match expected identity `{expected}`")]
    SubjectMismatch { expected: String, found: String },

    #[error("CSR self-signature verification failed")]
    BadCsrSignature,

    #[error("certificate carries no common name")]
    MissingCommonName,
}

impl CryptoError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
