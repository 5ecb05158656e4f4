//! HMAC-SHA256 signing helpers.
//!
//! Webhook bodies and orchestrator responses are authenticated with an HMAC-SHA256 digest over the raw bytes,
//! transmitted as lowercase hex. The same primitive is used on both the verify (inbound webhook) and compare
//! (orchestrator response) paths, so it lives here rather than in the server crate.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Error)]
pub enum SignatureValidationError {
    #[error("The signature is not valid hex: {0}")]
    InvalidHex(String),
    #[error("The signature does not match the payload")]
    InvalidSignature,
}

/// Compute the HMAC-SHA256 of `payload` under `secret` and return it as lowercase hex.
pub fn hmac_sha256_hex(secret: &str, payload: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded HMAC-SHA256 signature over `payload`. The comparison is constant-time via
/// [`Mac::verify_slice`].
pub fn verify_hmac_sha256(secret: &str, payload: &[u8], signature_hex: &str) -> Result<(), SignatureValidationError> {
    let expected =
        hex::decode(signature_hex.trim()).map_err(|e| SignatureValidationError::InvalidHex(e.to_string()))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload);
    mac.verify_slice(&expected).map_err(|_| SignatureValidationError::InvalidSignature)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let sig = hmac_sha256_hex("s3kr1t", b"{\"event\":\"PAYMENT_RECEIVED\"}");
        assert_eq!(sig.len(), 64);
        verify_hmac_sha256("s3kr1t", b"{\"event\":\"PAYMENT_RECEIVED\"}", &sig).unwrap();
    }

    #[test]
    fn tampered_payload_fails() {
        let sig = hmac_sha256_hex("s3kr1t", b"amount=100");
        let err = verify_hmac_sha256("s3kr1t", b"amount=999", &sig).unwrap_err();
        assert!(matches!(err, SignatureValidationError::InvalidSignature));
    }

    #[test]
    fn wrong_key_fails() {
        let sig = hmac_sha256_hex("key-a", b"payload");
        assert!(verify_hmac_sha256("key-b", b"payload", &sig).is_err());
    }

    #[test]
    fn garbage_hex_is_reported() {
        let err = verify_hmac_sha256("k", b"p", "not-hex-at-all").unwrap_err();
        assert!(matches!(err, SignatureValidationError::InvalidHex(_)));
    }

    #[test]
    fn known_vector() {
        // Verified against `echo -n "hello" | openssl dgst -sha256 -hmac "key"`.
        let sig = hmac_sha256_hex("key", b"hello");
        assert_eq!(sig, "9307b3b915efb5171ff14d8cb55fbcc798c6c0ef1456d66ded1a6aa723a58b7b");
    }
}
