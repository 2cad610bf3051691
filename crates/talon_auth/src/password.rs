use crate::policy::AccessPolicy;
use crate::scheme::{AUTHENTICATION, AuthScheme};
use http::HeaderMap;
use sha2::{Digest, Sha256};
use tracing::warn;

/// SHA-256 of the shared secret, upper-case hex. Both sides derive the same
/// value from configuration; only the hash ever crosses the wire.
pub fn hash_password(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes())).to_uppercase()
}

/// The shared-secret scheme: the simplest and weakest of the three. The
/// client sends `Authentication: Basic <hash>` and the server compares
/// strings. No key material, no per-identity distinction, so the access
/// policy is not consulted.
pub struct PasswordScheme {
    hash: String,
}

impl PasswordScheme {
    pub fn new(secret: &str) -> Self {
        Self {
            hash: hash_password(secret),
        }
    }
}

impl AuthScheme for PasswordScheme {
    fn client_headers(&self) -> Vec<(&'static str, String)> {
        vec![(AUTHENTICATION, format!("Basic {}", self.hash))]
    }

    fn authorize(&self, headers: &HeaderMap, _policy: &AccessPolicy) -> bool {
        let Some(value) = headers.get(AUTHENTICATION).and_then(|v| v.to_str().ok()) else {
            warn!("request carried no authentication header");
            return false;
        };
        let Some(presented) = value.strip_prefix("Basic ") else {
            warn!("request used an unexpected authentication scheme");
            return false;
        };
        if presented != self.hash {
            warn!("request carried a wrong password hash");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with(value: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(value) = value {
            headers.insert(AUTHENTICATION, HeaderValue::from_str(value).unwrap());
        }
        headers
    }

    #[test]
    fn hash_is_upper_hex_sha256() {
        assert_eq!(
            hash_password("hello world"),
            "B94D27B9934D3E08A52E52D7DA7DABFAC484EFE37A5380EE9088F7ACE2EFCDE9"
        );
    }

    #[test]
    fn matching_hash_authorizes() {
        let scheme = PasswordScheme::new("hunter2");
        let policy = AccessPolicy::new();
        let (name, value) = scheme.client_headers().remove(0);
        assert_eq!(name, AUTHENTICATION);

        assert!(scheme.authorize(&headers_with(Some(&value)), &policy));
    }

    #[test]
    fn wrong_or_missing_hash_rejects() {
        let scheme = PasswordScheme::new("hunter2");
        let policy = AccessPolicy::new();

        assert!(!scheme.authorize(&headers_with(None), &policy));
        assert!(!scheme.authorize(&headers_with(Some("Basic WRONG")), &policy));
        let bare_hash = hash_password("hunter2");
        assert!(!scheme.authorize(&headers_with(Some(&bare_hash)), &policy));
    }
}
