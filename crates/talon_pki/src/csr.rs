use crate::error::CryptoError;
use crate::keys::KeyPair;
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::{X509NameBuilder, X509Req, X509ReqBuilder};
use std::fs;
use std::path::Path;
use tracing::debug;

/// A certificate signing request: the subject's public key and name,
/// self-signed with the matching private key so the issuer can trust the key
/// without ever seeing the private half.
pub struct Csr {
    req: X509Req,
}

impl Csr {
    /// Builds a CSR for `CN=subject`, self-signed with SHA-256/RSA.
    pub fn generate(subject: &str, key_pair: &KeyPair) -> Result<Self, CryptoError> {
        let mut name = X509NameBuilder::new()?;
        name.append_entry_by_nid(Nid::COMMONNAME, subject)?;
        let name = name.build();

        let mut builder = X509ReqBuilder::new()?;
        builder.set_version(0)?;
        builder.set_subject_name(&name)?;
        builder.set_pubkey(key_pair.pkey())?;
        builder.sign(key_pair.pkey(), MessageDigest::sha256())?;

        debug!("generated new CSR for CN={subject}");
        Ok(Self {
            req: builder.build(),
        })
    }

    pub fn from_pem(pem: &[u8]) -> Result<Self, CryptoError> {
        Ok(Self {
            req: X509Req::from_pem(pem)?,
        })
    }

    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let pem = fs::read(path).map_err(CryptoError::io(path))?;
        Self::from_pem(&pem)
    }

    pub fn to_pem(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.req.to_pem()?)
    }

    /// Writes the CSR as PEM for offline transport to the issuer.
    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        fs::write(path, self.to_pem()?).map_err(CryptoError::io(path))?;
        debug!("wrote CSR to {}", path.display());
        Ok(())
    }

    /// Verifies the self-signature against the embedded public key. Must
    /// pass before the issuer trusts anything else in the request.
    pub fn verify_self_signature(&self) -> Result<(), CryptoError> {
        let public_key = self.req.public_key()?;
        if self.req.verify(&public_key)? {
            Ok(())
        } else {
            Err(CryptoError::BadCsrSignature)
        }
    }

    pub fn subject_common_name(&self) -> Result<String, CryptoError> {
        let entry = self
            .req
            .subject_name()
            .entries_by_nid(Nid::COMMONNAME)
            .next()
            .ok_or(CryptoError::MissingCommonName)?;
        Ok(entry.data().as_utf8()?.to_string())
    }

    pub(crate) fn inner(&self) -> &X509Req {
        &self.req
    }
}
