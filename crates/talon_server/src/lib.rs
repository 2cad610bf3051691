use crate::state::AppState;
use axum::{Router, routing::get};
use std::io;
use talon_core::config::{SchemeKind, ServerConfig};
use talon_pki::identity::ServerIdentity;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub mod api;
pub mod files;
pub mod state;
pub mod tls;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Crypto(#[from] talon_pki::error::CryptoError),

    #[error("cryptographic provider failure: {0}")]
    Provider(#[from] openssl::error::ErrorStack),

    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("mutual TLS requires a server identity")]
    MissingIdentity,
}

/// The builder for the pack server.
pub struct PackServer {
    config: ServerConfig,
}

impl PackServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Assembles the request router: the manifest document, individual files
    /// by name, and nothing else. Everything unknown, including anything
    /// unauthorized, answers 404.
    pub fn router(state: AppState) -> Router {
        Router::new()
            .route("/manifest", get(api::get_manifest))
            .route("/files/{name}", get(api::get_file))
            .fallback(api::not_found)
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Binds and serves until the task is cancelled. For the mutual-TLS
    /// scheme the listener speaks TLS and gates every connection on the
    /// peer certificate; the other schemes serve plain HTTP and gate per
    /// request.
    pub async fn run(
        self,
        state: AppState,
        identity: Option<&ServerIdentity>,
    ) -> Result<(), ServerError> {
        let addr = format!("{}:{}", self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(&addr).await?;
        info!("pack server listening on {addr}");

        let policy = state.policy.clone();
        let router = Self::router(state);
        match self.config.scheme {
            SchemeKind::MutualTls => {
                let identity = identity.ok_or(ServerError::MissingIdentity)?;
                let acceptor = tls::acceptor(identity)?;
                tls::serve_mutual_tls(listener, acceptor, router, policy).await?;
            }
            _ => {
                axum::serve(listener, router).await?;
            }
        }
        Ok(())
    }
}

pub mod prelude {
    pub use crate::api::*;
    pub use crate::files::*;
    pub use crate::state::*;
    pub use crate::{PackServer, ServerError};
}
