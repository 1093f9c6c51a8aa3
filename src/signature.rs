//! Webhook payload authentication via HMAC-SHA256
//!
//! The provider signs the exact raw request body with a shared secret and
//! sends the hex digest in a header. Verification runs strictly before any
//! business logic and fails closed.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Validates webhook signatures against the configured provider secret.
#[derive(Clone)]
pub struct SignatureValidator {
    secret: Vec<u8>,
}

impl SignatureValidator {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Check the supplied hex signature against HMAC-SHA256 of the raw
    /// payload bytes.
    ///
    /// Comparison is constant-time on the decoded digest bytes. Any failure
    /// mode (missing secret, undecodable or wrong-length signature) returns
    /// `false` rather than an error.
    pub fn validate(&self, payload: &[u8], signature_hex: &str) -> bool {
        if self.secret.is_empty() {
            return false;
        }

        let supplied = match hex::decode(signature_hex.trim()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let expected = match self.compute(payload) {
            Some(digest) => digest,
            None => return false,
        };

        if supplied.len() != expected.len() {
            return false;
        }

        expected.ct_eq(&supplied).into()
    }

    /// Hex HMAC-SHA256 digest of a payload, for outbound signing and tests.
    pub fn sign(&self, payload: &[u8]) -> String {
        self.compute(payload).map(hex::encode).unwrap_or_default()
    }

    fn compute(&self, payload: &[u8]) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(&self.secret).ok()?;
        mac.update(payload);
        Some(mac.finalize().into_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_signature_accepted() {
        let validator = SignatureValidator::new(b"secret".to_vec());
        let payload = br#"{"event_type":"transaction.created"}"#;

        let signature = validator.sign(payload);
        assert!(validator.validate(payload, &signature));
    }

    #[test]
    fn test_payload_bit_flip_rejected() {
        let validator = SignatureValidator::new(b"secret".to_vec());
        let payload = b"payload bytes";
        let signature = validator.sign(payload);

        let mut tampered = payload.to_vec();
        tampered[0] ^= 0x01;
        assert!(!validator.validate(&tampered, &signature));
    }

    #[test]
    fn test_signature_bit_flip_rejected() {
        let validator = SignatureValidator::new(b"secret".to_vec());
        let payload = b"payload bytes";
        let signature = validator.sign(payload);

        // Flip one nibble of the hex digest
        let mut chars: Vec<char> = signature.chars().collect();
        chars[0] = if chars[0] == '0' { '1' } else { '0' };
        let tampered: String = chars.into_iter().collect();

        assert!(!validator.validate(payload, &tampered));
    }

    #[test]
    fn test_garbage_signature_rejected() {
        let validator = SignatureValidator::new(b"secret".to_vec());
        assert!(!validator.validate(b"payload", "not-hex"));
        assert!(!validator.validate(b"payload", ""));
        assert!(!validator.validate(b"payload", "abcd"));
    }

    #[test]
    fn test_missing_secret_fails_closed() {
        let validator = SignatureValidator::new(Vec::new());
        let other = SignatureValidator::new(b"secret".to_vec());
        let payload = b"payload";
        let signature = other.sign(payload);

        assert!(!validator.validate(payload, &signature));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let signer = SignatureValidator::new(b"secret-a".to_vec());
        let verifier = SignatureValidator::new(b"secret-b".to_vec());
        let payload = b"payload";

        assert!(!verifier.validate(payload, &signer.sign(payload)));
    }
}
