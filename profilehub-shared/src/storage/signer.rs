/// HMAC-signed blob URLs
///
/// A signed URL has the form
/// `{base_url}/v1/blobs/{key}?expires={unix_seconds}&signature={hex}` where
/// the signature is HMAC-SHA256 over `"{key}\n{expires}"`. The blob route
/// recomputes it and compares in constant time.

use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Route prefix the signed URLs point at
pub const BLOB_ROUTE: &str = "/v1/blobs/";

/// Default lifetime of a signed URL
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("signed URL has expired")]
    Expired,

    #[error("signature is not valid hex")]
    Malformed,

    #[error("signature does not match")]
    Mismatch,
}

/// Signs and verifies blob read URLs
#[derive(Clone)]
pub struct UrlSigner {
    mac: HmacSha256,
    base_url: String,
}

impl fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UrlSigner")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl UrlSigner {
    /// Creates a signer. `base_url` is the public origin of the API; a
    /// trailing slash is ignored.
    pub fn new(secret: &[u8], base_url: impl Into<String>) -> Result<Self, SignatureError> {
        if secret.is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SignatureError::EmptySecret)?;
        let base_url = base_url.into().trim_end_matches('/').to_string();

        Ok(Self { mac, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Hex signature for `key` valid until `expires` (Unix seconds).
    pub fn signature(&self, key: &str, expires: i64) -> String {
        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Signed URL for `key` that stays valid for `ttl`.
    pub fn sign_url(&self, key: &str, ttl: Duration) -> String {
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        self.sign_url_until(key, expires)
    }

    /// Signed URL for `key` with an explicit expiry timestamp.
    pub fn sign_url_until(&self, key: &str, expires: i64) -> String {
        format!(
            "{}{}{}?expires={}&signature={}",
            self.base_url,
            BLOB_ROUTE,
            key,
            expires,
            self.signature(key, expires)
        )
    }

    /// Checks expiry first, then the signature in constant time.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> Result<(), SignatureError> {
        if expires < Utc::now().timestamp() {
            return Err(SignatureError::Expired);
        }

        let provided = hex::decode(signature).map_err(|_| SignatureError::Malformed)?;

        let mut mac = self.mac.clone();
        mac.update(key.as_bytes());
        mac.update(b"\n");
        mac.update(expires.to_string().as_bytes());
        mac.verify_slice(&provided).map_err(|_| SignatureError::Mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new(b"signer-test-secret-0123456789abcdef", "https://api.example.com/").unwrap()
    }

    fn query_param<'a>(url: &'a str, name: &str) -> &'a str {
        let query = url.split_once('?').unwrap().1;
        query
            .split('&')
            .find_map(|pair| pair.strip_prefix(&format!("{}=", name)))
            .unwrap()
    }

    #[test]
    fn test_signed_url_shape() {
        let url = signer().sign_url("uploads/1-1.png", Duration::from_secs(60));

        assert!(url.starts_with("https://api.example.com/v1/blobs/uploads/1-1.png?expires="));
        assert_eq!(query_param(&url, "signature").len(), 64);
    }

    #[test]
    fn test_verify_accepts_own_signature() {
        let signer = signer();
        let url = signer.sign_url("uploads/1-1.png", Duration::from_secs(60));
        let expires: i64 = query_param(&url, "expires").parse().unwrap();

        assert!(signer
            .verify("uploads/1-1.png", expires, query_param(&url, "signature"))
            .is_ok());
    }

    #[test]
    fn test_verify_rejects_tampering() {
        let signer = signer();
        let expires = Utc::now().timestamp() + 60;
        let sig = signer.signature("uploads/1-1.png", expires);

        assert_eq!(
            signer.verify("uploads/1-2.png", expires, &sig),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            signer.verify("uploads/1-1.png", expires + 1, &sig),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            signer.verify("uploads/1-1.png", expires, "zz"),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn test_verify_rejects_expired() {
        let signer = signer();
        let expires = Utc::now().timestamp() - 1;
        let sig = signer.signature("uploads/1-1.png", expires);

        assert_eq!(
            signer.verify("uploads/1-1.png", expires, &sig),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn test_different_secrets_disagree() {
        let other = UrlSigner::new(b"another-secret-entirely-0123456789", "https://api.example.com")
            .unwrap();
        let expires = Utc::now().timestamp() + 60;
        let sig = signer().signature("uploads/1-1.png", expires);

        assert!(other.verify("uploads/1-1.png", expires, &sig).is_err());
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        assert_eq!(
            UrlSigner::new(b"", "http://localhost").unwrap_err(),
            SignatureError::EmptySecret
        );
    }
}
