//! Webhook signature verification
//!
//! `X-Webhook-Signature` carries the hex HMAC-SHA256 of the raw request body,
//! optionally prefixed with `sha256=`. Comparison is constant time.

use hmac::{Hmac, Mac};
use sha2::Sha256;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureCheck {
    Valid,
    /// Header present but not hex
    Malformed,
    Mismatch,
}

/// Keyed HMAC, built once from the shared secret
#[derive(Clone)]
pub struct SignatureVerifier {
    keyed: HmacSha256,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, hmac::digest::InvalidLength> {
        Ok(Self {
            keyed: HmacSha256::new_from_slice(secret.as_ref())?,
        })
    }

    /// Hex signature of `body`
    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.keyed.clone();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    pub fn check(&self, body: &[u8], header_value: &str) -> SignatureCheck {
        let provided = header_value.trim();
        let provided = provided.strip_prefix("sha256=").unwrap_or(provided);
        let Ok(provided) = hex::decode(provided) else {
            return SignatureCheck::Malformed;
        };

        let mut mac = self.keyed.clone();
        mac.update(body);
        match mac.verify_slice(&provided) {
            Ok(()) => SignatureCheck::Valid,
            Err(_) => SignatureCheck::Mismatch,
        }
    }
}
