use crate::csr::Csr;
use crate::error::CryptoError;
use crate::keys::KeyPair;
use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::x509::extension::{BasicConstraints, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509, X509Builder, X509NameBuilder, X509Ref};
use std::fs;
use std::path::Path;
use tracing::debug;

/// The maximum representable X.509 date: 9999-12-31T23:59:59Z.
const MAX_X509_NOT_AFTER_UNIX: i64 = 253_402_300_799;

/// Long-lived certificates are backdated one year so a software clock that
/// jumps backwards during time synchronization does not invalidate them.
const CLOCK_SKEW_BACKDATE_SECS: i64 = 365 * 86_400;

const SERIAL_BITS: i32 = 128;

pub const DEFAULT_LEAF_VALIDITY_DAYS: u32 = 14;

/// The two issuance modes: effectively-unbounded validity for roots and other
/// infrastructure certificates, and a short window for leaf credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// not-before = now − 1 year, not-after = the X.509 maximum.
    LongLived,
    /// not-before = now, not-after = now + `days`.
    Leaf { days: u32 },
}

impl Default for Validity {
    fn default() -> Self {
        Self::Leaf {
            days: DEFAULT_LEAF_VALIDITY_DAYS,
        }
    }
}

impl Validity {
    fn window(self) -> (i64, i64) {
        let now = chrono::Utc::now().timestamp();
        match self {
            Self::LongLived => (now - CLOCK_SKEW_BACKDATE_SECS, MAX_X509_NOT_AFTER_UNIX),
            Self::Leaf { days } => (now, now + i64::from(days) * 86_400),
        }
    }
}

/// Issues a self-signed certificate for `CN=subject`, signed with the key
/// pair's own private key. Used for CA roots; the result carries CA basic
/// constraints and a DNS SubjectAltName matching the subject.
pub fn issue_self_signed(
    subject: &str,
    key_pair: &KeyPair,
    validity: Validity,
) -> Result<X509, CryptoError> {
    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_nid(Nid::COMMONNAME, subject)?;
    let name = name.build();

    let (not_before, not_after) = validity.window();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&*random_serial()?)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_not_before(&*Asn1Time::from_unix(not_before)?)?;
    builder.set_not_after(&*Asn1Time::from_unix(not_after)?)?;
    builder.set_pubkey(key_pair.pkey())?;

    builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_cert_sign()
            .crl_sign()
            .build()?,
    )?;
    let san = SubjectAlternativeName::new()
        .dns(subject)
        .build(&builder.x509v3_context(None, None))?;
    builder.append_extension(san)?;

    builder.sign(key_pair.pkey(), MessageDigest::sha256())?;
    let cert = builder.build();

    if !cert.verify(key_pair.pkey())? {
        return Err(CryptoError::BadCsrSignature);
    }
    debug!("issued self-signed certificate for CN={subject}");
    Ok(cert)
}

/// Signs a CSR with the issuer's key, producing a leaf certificate.
///
/// The CSR's self-signature is verified before its public key is trusted.
/// Subject comes from the CSR, issuer from `issuer_cert`, the serial is a
/// fresh 128-bit random value, and key usage is fixed to
/// {digitalSignature, keyEncipherment}.
pub fn sign_csr(
    csr: &Csr,
    issuer_cert: &X509Ref,
    issuer_key: &KeyPair,
    validity: Validity,
) -> Result<X509, CryptoError> {
    csr.verify_self_signature()?;

    let subject_cn = csr.subject_common_name()?;
    let (not_before, not_after) = validity.window();

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&*random_serial()?)?;
    builder.set_subject_name(csr.inner().subject_name())?;
    builder.set_issuer_name(issuer_cert.subject_name())?;
    builder.set_not_before(&*Asn1Time::from_unix(not_before)?)?;
    builder.set_not_after(&*Asn1Time::from_unix(not_after)?)?;
    builder.set_pubkey(&*csr.inner().public_key()?)?;

    builder.append_extension(BasicConstraints::new().build()?)?;
    builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()?,
    )?;
    let san = SubjectAlternativeName::new()
        .dns(&subject_cn)
        .build(&builder.x509v3_context(Some(issuer_cert), None))?;
    builder.append_extension(san)?;

    builder.sign(issuer_key.pkey(), MessageDigest::sha256())?;
    debug!("signed CSR for CN={subject_cn}");
    Ok(builder.build())
}

/// Writes certificates as concatenated PEM blocks, leaf first.
pub fn write_pem_chain(path: &Path, certs: &[X509]) -> Result<(), CryptoError> {
    let mut pem = Vec::new();
    for cert in certs {
        pem.extend_from_slice(&cert.to_pem()?);
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(CryptoError::io(path))?;
    }
    fs::write(path, pem).map_err(CryptoError::io(path))?;
    debug!("wrote {} certificates to {}", certs.len(), path.display());
    Ok(())
}

/// Loads every certificate present in a PEM file, in file order (leaf
/// first). An empty file is an error: trust material must not silently
/// vanish.
pub fn load_pem_chain(path: &Path) -> Result<Vec<X509>, CryptoError> {
    let pem = fs::read(path).map_err(CryptoError::io(path))?;
    let certs = X509::stack_from_pem(&pem)?;
    if certs.is_empty() {
        return Err(CryptoError::EmptyChain(path.to_path_buf()));
    }
    debug!("loaded {} certificates from {}", certs.len(), path.display());
    Ok(certs)
}

/// Extracts the subject common name of a certificate.
pub fn common_name(cert: &X509Ref) -> Result<String, CryptoError> {
    let entry = cert
        .subject_name()
        .entries_by_nid(Nid::COMMONNAME)
        .next()
        .ok_or(CryptoError::MissingCommonName)?;
    Ok(entry.data().as_utf8()?.to_string())
}

fn random_serial() -> Result<Asn1Integer, CryptoError> {
    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial.to_asn1_integer()?)
}
