use crate::policy::AccessPolicy;
use crate::scheme::{
    AUTHENTICATION, AUTHENTICATION_ID, AUTHENTICATION_KEY, AUTHENTICATION_KEY_EXPIRE,
    AUTHENTICATION_KEY_SIGNATURE, AUTHENTICATION_SIGNATURE, AuthScheme,
};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use http::HeaderMap;
use openssl::pkey::{PKey, Private, Public};
use sha2::{Digest, Sha256};
use talon_core::error::ConfigError;
use talon_pki::keys::{sign_sha256_rsa, verify_sha256_rsa};
use tracing::warn;
use uuid::Uuid;

/// Marker value of the `Authentication` header for this scheme.
pub const SIGNED_ID: &str = "SignedId";

/// A profile key pair obtained from an external identity service, never
/// generated locally. The service binds the public key to an expiry and
/// countersigns that binding with its own ("services") key.
pub struct ProfileCredential {
    pub private_key_pem: Vec<u8>,
    /// SubjectPublicKeyInfo PEM of the public half.
    pub public_key_pem: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    /// Services signature over {session id + expiry + public key DER}.
    pub key_signature: Vec<u8>,
}

struct SigningHandler {
    signing_key: PKey<Private>,
    public_key_pem: Vec<u8>,
    expires_at: DateTime<Utc>,
    key_signature: Vec<u8>,
}

/// The signed-session-token scheme.
///
/// Client side: signs a digest of the session id with the profile private
/// key and forwards the service-issued key binding, proving both key
/// possession and that a trusted third party bound this key to this session.
/// Server side: replays all of that verification against the trusted
/// services public key plus the access policy.
pub struct SignedTokenScheme {
    session_id: Option<Uuid>,
    signer: Option<SigningHandler>,
    services_key: Option<PKey<Public>>,
}

impl SignedTokenScheme {
    /// Client-side construction. A missing session id or credential is not
    /// an error: the client proceeds unsigned and expects server-side
    /// rejection. A credential that fails to parse is a config-level fault.
    pub fn for_client(
        session_id: Option<Uuid>,
        credential: Option<ProfileCredential>,
    ) -> Result<Self, ConfigError> {
        let signer = credential
            .map(|credential| {
                let signing_key = PKey::private_key_from_pem(&credential.private_key_pem)
                    .map_err(|e| ConfigError::Invalid {
                        setting: "profile_credential",
                        reason: format!("profile private key does not parse: {e}"),
                    })?;
                Ok::<_, ConfigError>(SigningHandler {
                    signing_key,
                    public_key_pem: credential.public_key_pem,
                    expires_at: credential.expires_at,
                    key_signature: credential.key_signature,
                })
            })
            .transpose()?;

        Ok(Self {
            session_id,
            signer,
            services_key: None,
        })
    }

    /// Server-side construction from the trusted services public key (PEM).
    pub fn for_server(services_key_pem: &[u8]) -> Result<Self, ConfigError> {
        let services_key =
            PKey::public_key_from_pem(services_key_pem).map_err(|e| ConfigError::Invalid {
                setting: "services_key_file",
                reason: format!("services public key does not parse: {e}"),
            })?;
        Ok(Self {
            session_id: None,
            signer: None,
            services_key: Some(services_key),
        })
    }
}

/// SHA-256 over the session id as its 16 big-endian bytes. This digest, not
/// the raw id, is what the profile key signs.
pub fn session_digest(session_id: &Uuid) -> Vec<u8> {
    Sha256::digest(session_id.as_bytes()).to_vec()
}

/// The payload the external service countersigns to bind a public key to a
/// session: 16-byte session id + 8-byte expiry epoch-millis (big-endian) +
/// raw SubjectPublicKeyInfo DER.
pub fn key_binding_payload(
    session_id: &Uuid,
    expires_at: DateTime<Utc>,
    public_key_der: &[u8],
) -> Vec<u8> {
    let mut payload = Vec::with_capacity(24 + public_key_der.len());
    payload.extend_from_slice(session_id.as_bytes());
    payload.extend_from_slice(&expires_at.timestamp_millis().to_be_bytes());
    payload.extend_from_slice(public_key_der);
    payload
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl AuthScheme for SignedTokenScheme {
    fn client_headers(&self) -> Vec<(&'static str, String)> {
        let (Some(session_id), Some(signer)) = (self.session_id, self.signer.as_ref()) else {
            warn!(
                "no profile key pair is available for this session; \
                 proceeding without signed headers"
            );
            return Vec::new();
        };

        let signature = match sign_sha256_rsa(&signer.signing_key, &session_digest(&session_id)) {
            Ok(signature) => signature,
            Err(e) => {
                warn!("failed to sign session id, proceeding unsigned: {e}");
                return Vec::new();
            }
        };

        vec![
            (AUTHENTICATION, SIGNED_ID.to_string()),
            (AUTHENTICATION_ID, session_id.to_string()),
            (AUTHENTICATION_SIGNATURE, BASE64.encode(signature)),
            (AUTHENTICATION_KEY, BASE64.encode(&signer.public_key_pem)),
            (
                AUTHENTICATION_KEY_EXPIRE,
                BASE64.encode(signer.expires_at.to_rfc3339().as_bytes()),
            ),
            (
                AUTHENTICATION_KEY_SIGNATURE,
                BASE64.encode(&signer.key_signature),
            ),
        ]
    }

    fn authorize(&self, headers: &HeaderMap, policy: &AccessPolicy) -> bool {
        let Some(services_key) = self.services_key.as_ref() else {
            warn!("no trusted services key configured; rejecting signed-token request");
            return false;
        };

        if header(headers, AUTHENTICATION) != Some(SIGNED_ID) {
            warn!("client attempted login without proper authentication header setup");
            return false;
        }

        // 1. The session id must be a well-formed UUID.
        let Some(id_value) = header(headers, AUTHENTICATION_ID) else {
            warn!("client attempted login without a session id");
            return false;
        };
        let session_id = match Uuid::parse_str(id_value) {
            Ok(id) => id,
            Err(_) => {
                warn!("client attempted login with an invalid session id format: {id_value}");
                return false;
            }
        };

        // 2. The presented public key must decode and parse as RSA.
        let Some(key_value) = header(headers, AUTHENTICATION_KEY) else {
            warn!("client attempted login without a public key");
            return false;
        };
        let Ok(key_pem) = BASE64.decode(key_value) else {
            warn!("client attempted login with an undecodable public key");
            return false;
        };
        let presented_key = match PKey::public_key_from_pem(&key_pem) {
            Ok(key) => key,
            Err(_) => {
                warn!("client attempted login with a public key that is not valid RSA");
                return false;
            }
        };

        // 3. The expiry must parse and lie in the future.
        let Some(expire_value) = header(headers, AUTHENTICATION_KEY_EXPIRE) else {
            warn!("client attempted login without key expiry information");
            return false;
        };
        let Ok(expire_bytes) = BASE64.decode(expire_value) else {
            warn!("client attempted login with undecodable key expiry information");
            return false;
        };
        let expires_at = match std::str::from_utf8(&expire_bytes)
            .ok()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        {
            Some(instant) => instant.with_timezone(&Utc),
            None => {
                warn!("client attempted login with an unparseable key expiry");
                return false;
            }
        };
        if expires_at < Utc::now() {
            warn!("client attempted login with an expired public key");
            return false;
        }

        // 4. The trusted service must have bound exactly this key to this
        //    session id and expiry; otherwise the key is client-forged.
        let Some(key_signature) = header(headers, AUTHENTICATION_KEY_SIGNATURE)
            .and_then(|v| BASE64.decode(v).ok())
        else {
            warn!("client attempted login without a decodable key signature");
            return false;
        };
        let Ok(presented_key_der) = presented_key.public_key_to_der() else {
            warn!("failed to re-encode the presented public key");
            return false;
        };
        let binding = key_binding_payload(&session_id, expires_at, &presented_key_der);
        if !verify_sha256_rsa(services_key, &binding, &key_signature) {
            warn!("client presented a public key not vouched for by the services key");
            return false;
        }

        // 5. The client must actually hold the matching private key.
        let Some(session_signature) = header(headers, AUTHENTICATION_SIGNATURE)
            .and_then(|v| BASE64.decode(v).ok())
        else {
            warn!("client attempted login without a decodable session signature");
            return false;
        };
        if !verify_sha256_rsa(
            &presented_key,
            &session_digest(&session_id),
            &session_signature,
        ) {
            warn!("client attempted login with an invalid session signature");
            return false;
        }

        // 6. Finally, the identity must be allowed at all.
        if !policy.is_allowed(&session_id.to_string()) {
            warn!("session id {session_id} is not on the allow-list");
            return false;
        }

        true
    }
}
