//! HMAC signatures for presigned download URLs.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("signature is malformed")]
    Malformed,
    #[error("signature does not match")]
    Mismatch,
    #[error("link expired")]
    Expired,
}

/// Issues and checks time-limited download links for stored objects.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner").field("base_url", &self.base_url).finish()
    }
}

impl UrlSigner {
    pub fn new(secret: &str, base_url: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn mac(&self, object_key: &str, expires: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(format!("GET\n{object_key}\n{expires}").as_bytes());
        mac
    }

    pub fn signature(&self, object_key: &str, expires: i64) -> String {
        URL_SAFE_NO_PAD.encode(self.mac(object_key, expires).finalize().into_bytes())
    }

    /// Full URL for `object_key`, valid until the unix timestamp `expires`.
    pub fn presign(&self, object_key: &str, expires: i64) -> String {
        format!(
            "{}/downloads/{}?expires={}&signature={}",
            self.base_url,
            object_key,
            expires,
            self.signature(object_key, expires)
        )
    }

    pub fn verify(
        &self,
        object_key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), SignatureError> {
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| SignatureError::Malformed)?;
        self.mac(object_key, expires)
            .verify_slice(&provided)
            .map_err(|_| SignatureError::Mismatch)?;
        if now > expires {
            return Err(SignatureError::Expired);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer() -> UrlSigner {
        UrlSigner::new("storage-secret", "https://shop.example.com/")
    }

    #[test]
    fn presigned_url_round_trips() {
        let s = signer();
        let url = s.presign("abc123", 1_000);
        assert!(url.starts_with("https://shop.example.com/downloads/abc123?expires=1000&signature="));
        let sig = url.rsplit("signature=").next().unwrap();
        assert_eq!(s.verify("abc123", 1_000, sig, 999), Ok(()));
    }

    #[test]
    fn expired_link_is_rejected() {
        let s = signer();
        let sig = s.signature("abc123", 1_000);
        assert_eq!(s.verify("abc123", 1_000, &sig, 1_001), Err(SignatureError::Expired));
    }

    #[test]
    fn tampering_is_detected() {
        let s = signer();
        let sig = s.signature("abc123", 1_000);
        assert_eq!(s.verify("abc124", 1_000, &sig, 0), Err(SignatureError::Mismatch));
        assert_eq!(s.verify("abc123", 2_000, &sig, 0), Err(SignatureError::Mismatch));
        let other = UrlSigner::new("other", "https://shop.example.com");
        assert_eq!(other.verify("abc123", 1_000, &sig, 0), Err(SignatureError::Mismatch));
    }

    #[test]
    fn garbage_signature_is_malformed() {
        assert_eq!(signer().verify("k", 10, "not base64!!", 0), Err(SignatureError::Malformed));
    }
}
