//! Stateless signed tokens for email confirmation links
//!
//! `token = hex(sha256(hex(sha256(secret || subject))))`. Tokens are
//! deterministic and never expire; rotating the secret invalidates all of them.

use std::sync::Arc;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

#[derive(Clone)]
pub struct TokenSigner {
    secret: Arc<str>,
}

impl TokenSigner {
    #[must_use]
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: Arc::from(secret.into()),
        }
    }

    #[must_use]
    pub fn sign(&self, subject: &str) -> String {
        let mut inner = Sha256::new();
        inner.update(self.secret.as_bytes());
        inner.update(subject.as_bytes());
        let inner = hex::encode(inner.finalize());

        hex::encode(Sha256::digest(inner.as_bytes()))
    }

    /// Constant-time comparison against the expected token
    #[must_use]
    pub fn verify(&self, subject: &str, token: &str) -> bool {
        let expected = self.sign(subject);
        expected.as_bytes().ct_eq(token.as_bytes()).into()
    }
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner").field("secret", &"[REDACTED]").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_is_deterministic_double_sha256() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign("abc123");

        let inner = hex::encode(Sha256::digest(b"secretabc123"));
        let expected = hex::encode(Sha256::digest(inner.as_bytes()));
        assert_eq!(token, expected);
        assert_eq!(token, signer.sign("abc123"));
        assert_eq!(token.len(), 64);
    }

    #[test]
    fn test_verify() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign("record-1");
        assert!(signer.verify("record-1", &token));
        assert!(!signer.verify("record-2", &token));
        assert!(!TokenSigner::new("other").verify("record-1", &token));
        assert!(!signer.verify("record-1", &token[..63]));
        assert!(!signer.verify("record-1", ""));
    }

    #[test]
    fn test_any_single_bit_flip_is_rejected() {
        let signer = TokenSigner::new("secret");
        let token = signer.sign("record-1");
        for i in 0..token.len() {
            for bit in 0..8 {
                let mut bytes = token.clone().into_bytes();
                bytes[i] ^= 1 << bit;
                let forged = String::from_utf8_lossy(&bytes).into_owned();
                assert!(!signer.verify("record-1", &forged));
            }
        }
    }

    #[test]
    fn test_debug_redacts_secret() {
        assert!(!format!("{:?}", TokenSigner::new("hunter2")).contains("hunter2"));
    }
}
