use crate::certs::{self, Validity, common_name, load_pem_chain, sign_csr, write_pem_chain};
use crate::csr::Csr;
use crate::error::CryptoError;
use crate::keys::KeyPair;
use openssl::x509::X509;
use std::path::{Path, PathBuf};
use talon_core::config::{ClientConfig, ServerConfig};
use tracing::{info, warn};

/// File name the client writes its pending signing request to.
pub const CLIENT_CSR_FILE: &str = "serverrequest.csr";

/// The server's trust material: the CA root it issues client certificates
/// from, and the TLS leaf it presents on the wire.
///
/// Both key pairs are get-or-create: the first run bootstraps them, later
/// runs reuse the persisted files. A certificate that loads but names a
/// different subject than configured is fatal; re-issuing it would orphan
/// every client certificate already signed by it.
pub struct ServerIdentity {
    ca_key: KeyPair,
    ca_cert: X509,
    tls_key: KeyPair,
    tls_cert: X509,
}

impl ServerIdentity {
    pub fn load_or_create(dir: &Path, config: &ServerConfig) -> Result<Self, CryptoError> {
        let ca_subject = format!("{} CA", config.name);
        let ca_key = KeyPair::load_or_create(&dir.join(&config.ca_key_file))?;

        let ca_cert_path = dir.join(&config.ca_certificate_file);
        let ca_cert = if ca_cert_path.exists() {
            let cert = load_pem_chain(&ca_cert_path)?.remove(0);
            expect_subject(&cert, &ca_subject)?;
            cert
        } else {
            info!("issuing new CA root for {}", ca_subject);
            let cert = certs::issue_self_signed(&ca_subject, &ca_key, Validity::LongLived)?;
            write_pem_chain(&ca_cert_path, std::slice::from_ref(&cert))?;
            cert
        };

        let tls_key = KeyPair::load_or_create(&dir.join(&config.tls_key_file))?;
        let tls_cert_path = dir.join(&config.tls_certificate_file);
        let tls_cert = if tls_cert_path.exists() {
            let cert = load_pem_chain(&tls_cert_path)?.remove(0);
            expect_subject(&cert, &config.name)?;
            cert
        } else {
            info!("issuing new TLS certificate for {}", config.name);
            let csr = Csr::generate(&config.name, &tls_key)?;
            // The server's own leaf is long-lived: a 14-day horizon would
            // take the server down on expiry, unlike a client credential
            // that can be re-requested.
            let cert = sign_csr(&csr, &ca_cert, &ca_key, Validity::LongLived)?;
            write_pem_chain(&tls_cert_path, std::slice::from_ref(&cert))?;
            cert
        };

        Ok(Self {
            ca_key,
            ca_cert,
            tls_key,
            tls_cert,
        })
    }

    pub fn ca_key(&self) -> &KeyPair {
        &self.ca_key
    }

    pub fn ca_cert(&self) -> &X509 {
        &self.ca_cert
    }

    pub fn tls_key(&self) -> &KeyPair {
        &self.tls_key
    }

    /// Chain presented on the wire, leaf first.
    pub fn tls_chain(&self) -> Vec<X509> {
        vec![self.tls_cert.clone(), self.ca_cert.clone()]
    }

    /// Signs a client CSR with the CA root, at the standard leaf validity.
    pub fn issue_client_certificate(&self, csr: &Csr) -> Result<X509, CryptoError> {
        sign_csr(csr, &self.ca_cert, &self.ca_key, Validity::default())
    }
}

/// Client credential bootstrap outcome. Until an operator signs the CSR and
/// places the resulting chain next to the key, the client has no credential
/// and mutual TLS cannot proceed.
pub enum ClientCredential {
    Ready(ClientIdentity),
    /// No certificate yet; a CSR was written for offline signing.
    Pending { csr_path: PathBuf },
}

/// A client's mutual-TLS credential: its key pair plus the CA-issued chain.
pub struct ClientIdentity {
    key: KeyPair,
    chain: Vec<X509>,
}

impl ClientIdentity {
    /// Loads the client credential, or generates the key and a CSR on first
    /// run. A certificate issued for a different identity than `user_id` is
    /// fatal, never silently replaced.
    pub fn load_or_create(
        dir: &Path,
        config: &ClientConfig,
        user_id: &str,
    ) -> Result<ClientCredential, CryptoError> {
        let key = KeyPair::load_or_create(&dir.join(&config.key_file))?;

        let cert_path = dir.join(&config.certificate_file);
        if cert_path.exists() {
            let chain = load_pem_chain(&cert_path)?;
            expect_subject(&chain[0], user_id)?;
            return Ok(ClientCredential::Ready(Self { key, chain }));
        }

        let csr_path = dir.join(CLIENT_CSR_FILE);
        let csr = Csr::generate(user_id, &key)?;
        csr.save(&csr_path)?;
        warn!(
            "no client certificate found; a new signing request was written to {}. \
             Get it signed by the server operator, place the resulting chain at {}, \
             and restart.",
            csr_path.display(),
            cert_path.display()
        );
        Ok(ClientCredential::Pending { csr_path })
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    /// PEM bundle of private key + chain, the form TLS client builders
    /// consume as an identity.
    pub fn identity_pem(&self) -> Result<Vec<u8>, CryptoError> {
        let mut pem = self.key.private_key_pem()?;
        for cert in &self.chain {
            pem.extend_from_slice(&cert.to_pem()?);
        }
        Ok(pem)
    }
}

fn expect_subject(cert: &X509, expected: &str) -> Result<(), CryptoError> {
    let found = common_name(cert)?;
    if found == expected {
        Ok(())
    } else {
        Err(CryptoError::SubjectMismatch {
            expected: expected.to_string(),
            found,
        })
    }
}
