use crate::error::CryptoError;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

const RSA_KEY_BITS: u32 = 4096;

/// An RSA key pair owned by exactly one identity (CA root, server, or
/// client). Immutable once created; persisted as PKCS#8 DER.
pub struct KeyPair {
    key: PKey<Private>,
}

impl KeyPair {
    /// Generates a fresh RSA-4096 key pair from the system CSPRNG. Failure
    /// here (entropy exhaustion, missing algorithm) is fatal and not retried.
    pub fn generate() -> Result<Self, CryptoError> {
        let rsa = Rsa::generate(RSA_KEY_BITS)?;
        let key = PKey::from_rsa(rsa)?;
        debug!("generated new RSA-{RSA_KEY_BITS} key pair");
        Ok(Self { key })
    }

    pub fn from_pkcs8_der(der: &[u8]) -> Result<Self, CryptoError> {
        let key = PKey::private_key_from_pkcs8(der)?;
        Ok(Self { key })
    }

    pub fn load(path: &Path) -> Result<Self, CryptoError> {
        let der = fs::read(path).map_err(CryptoError::io(path))?;
        let pair = Self::from_pkcs8_der(&der)?;
        debug!("loaded private key from {}", path.display());
        Ok(pair)
    }

    pub fn save(&self, path: &Path) -> Result<(), CryptoError> {
        let der = self.key.private_key_to_pkcs8()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(CryptoError::io(path))?;
        }
        fs::write(path, der).map_err(CryptoError::io(path))?;
        debug!("wrote private key to {}", path.display());
        Ok(())
    }

    /// Loads the key at `path`, or generates and persists a new one if the
    /// file does not exist yet. First run bootstraps the trust material,
    /// every later run reuses it. The same pattern serves CA roots, server
    /// identities and client identities.
    pub fn load_or_create(path: &Path) -> Result<Self, CryptoError> {
        if path.exists() {
            return Self::load(path);
        }
        info!(
            "generating new private key for new installation at {}",
            path.display()
        );
        let pair = Self::generate()?;
        pair.save(path)?;
        Ok(pair)
    }

    pub fn pkey(&self) -> &PKey<Private> {
        &self.key
    }

    /// SubjectPublicKeyInfo DER of the public half.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.key.public_key_to_der()?)
    }

    pub fn public_key_pem(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.key.public_key_to_pem()?)
    }

    pub fn private_key_pem(&self) -> Result<Vec<u8>, CryptoError> {
        Ok(self.key.private_key_to_pem_pkcs8()?)
    }

    pub fn sign_sha256(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        sign_sha256_rsa(&self.key, payload)
    }
}

/// SHA-256/RSA signature over `payload`.
pub fn sign_sha256_rsa(key: &PKey<Private>, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut signer = Signer::new(MessageDigest::sha256(), key)?;
    signer.update(payload)?;
    Ok(signer.sign_to_vec()?)
}

/// SHA-256/RSA verification; malformed input counts as a failed check, not an
/// error.
pub fn verify_sha256_rsa(key: &PKey<Public>, payload: &[u8], signature: &[u8]) -> bool {
    let Ok(mut verifier) = Verifier::new(MessageDigest::sha256(), key) else {
        return false;
    };
    if verifier.update(payload).is_err() {
        return false;
    }
    verifier.verify(signature).unwrap_or(false)
}
