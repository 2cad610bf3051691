use crate::ServerError;
use crate::state::PeerIdentity;
use axum::{Extension, Router, body::Body};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig as RustlsServerConfig};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use talon_auth::policy::AccessPolicy;
use talon_pki::certs::common_name;
use talon_pki::identity::ServerIdentity;
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tracing::{debug, warn};

const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Builds the mutual-TLS acceptor: the server presents its leaf + CA chain
/// and requires a client certificate chaining to the same CA.
pub fn acceptor(identity: &ServerIdentity) -> Result<TlsAcceptor, ServerError> {
    let mut roots = RootCertStore::empty();
    roots
        .add(CertificateDer::from(identity.ca_cert().to_der()?))
        .map_err(|e| ServerError::TlsConfig(format!("failed to add CA certificate: {e}")))?;

    let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
        .build()
        .map_err(|e| ServerError::TlsConfig(format!("client verifier error: {e}")))?;

    let mut chain = Vec::new();
    for cert in identity.tls_chain() {
        chain.push(CertificateDer::from(cert.to_der()?));
    }
    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
        identity.tls_key().pkey().private_key_to_pkcs8()?,
    ));

    let config = RustlsServerConfig::builder()
        .with_client_cert_verifier(verifier)
        .with_single_cert(chain, key)
        .map_err(|e| ServerError::TlsConfig(format!("server config error: {e}")))?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}

/// Accept loop for the mutual-TLS scheme.
///
/// Each connection is handshaken, then the peer certificate's common name is
/// checked against the access policy. A rejected peer is disconnected right
/// here, before a single request is read. Accepted connections serve the
/// router with the verified identity attached, one request at a time.
pub async fn serve_mutual_tls(
    listener: TcpListener,
    acceptor: TlsAcceptor,
    router: Router,
    policy: AccessPolicy,
) -> io::Result<()> {
    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let router = router.clone();
        let policy = policy.clone();

        tokio::spawn(async move {
            let handshake = tokio::time::timeout(TLS_HANDSHAKE_TIMEOUT, acceptor.accept(stream));
            let tls_stream = match handshake.await {
                Ok(Ok(stream)) => stream,
                Ok(Err(e)) => {
                    warn!("TLS handshake with {peer_addr} failed: {e}");
                    return;
                }
                Err(_) => {
                    warn!("TLS handshake with {peer_addr} timed out");
                    return;
                }
            };

            let Some(identity) = peer_common_name(tls_stream.get_ref().1) else {
                warn!("peer {peer_addr} presented no usable certificate, closing");
                return;
            };
            if !policy.is_allowed(&identity) {
                warn!("peer {identity} is not on the allow-list, closing connection");
                return;
            }
            debug!("serving authenticated peer {identity} from {peer_addr}");

            let router = router.layer(Extension(PeerIdentity(identity)));
            let service = hyper::service::service_fn(move |request: http::Request<Incoming>| {
                router.clone().oneshot(request.map(Body::new))
            });

            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(tls_stream), service)
                .await
            {
                debug!("connection from {peer_addr} ended with error: {e}");
            }
        });
    }
}

fn peer_common_name(connection: &rustls::ServerConnection) -> Option<String> {
    let leaf = connection.peer_certificates()?.first()?;
    let cert = openssl::x509::X509::from_der(leaf.as_ref()).ok()?;
    common_name(&cert).ok()
}
