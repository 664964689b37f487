// SPDX-FileCopyrightText: 2026 Rendez Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bearer token signing and offline verification.
//!
//! Tokens have the shape `<session_id>.<expires_at>.<mac>` where `mac` is
//! the hex HMAC-SHA256 of `<session_id>.<expires_at>` under the process-wide
//! shared secret. Verification needs no store round trip; callers confirm
//! the session record still exists separately.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use rendez_core::RendezError;

type HmacSha256 = Hmac<Sha256>;

/// Claims recovered from a verified token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// Session the token was issued for.
    pub session_id: String,
    /// Unix seconds after which the token is no longer valid.
    pub expires_at: i64,
}

/// Signs and verifies bearer tokens under one shared secret.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("secret", &"[redacted]")
            .finish()
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        Self {
            secret: secret.as_bytes().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.secret).expect("hmac key length is unrestricted")
    }

    /// Produce a signed token for `session_id`, valid until `expires_at`.
    pub fn sign(&self, session_id: &str, expires_at: i64) -> String {
        let message = format!("{session_id}.{expires_at}");
        let mut mac = self.mac();
        mac.update(message.as_bytes());
        let tag = hex::encode(mac.finalize().into_bytes());
        format!("{message}.{tag}")
    }

    /// Verify a token offline and recover its claims.
    ///
    /// The signature is checked before expiry so a tampered expiry cannot
    /// masquerade as a merely expired token.
    pub fn verify(&self, token: &str, now: i64) -> Result<TokenClaims, RendezError> {
        let parts: Vec<&str> = token.split('.').collect();
        let [session_id, expires_str, tag_hex] = parts.as_slice() else {
            return Err(RendezError::auth("malformed token"));
        };

        let expires_at: i64 = expires_str
            .parse()
            .map_err(|_| RendezError::auth("malformed token"))?;

        let message = format!("{session_id}.{expires_at}");
        let tag = hex::decode(tag_hex).map_err(|_| RendezError::auth("malformed token"))?;

        let mut mac = self.mac();
        mac.update(message.as_bytes());
        mac.verify_slice(&tag)
            .map_err(|_| RendezError::auth("invalid token"))?;

        if now >= expires_at {
            return Err(RendezError::auth("token expired"));
        }

        Ok(TokenClaims {
            session_id: (*session_id).to_string(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn sign_verify_round_trip() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.sign("sess-1", 2_000_000_000);
        let claims = signer.verify(&token, 1_000_000_000).unwrap();
        assert_eq!(claims.session_id, "sess-1");
        assert_eq!(claims.expires_at, 2_000_000_000);
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.sign("sess-1", 1_000);
        let err = signer.verify(&token, 1_000).unwrap_err();
        assert!(err.to_string().contains("expired"));
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.sign("sess-1", 2_000_000_000);
        let mut tampered = token.clone();
        tampered.pop();
        tampered.push(if token.ends_with('0') { '1' } else { '0' });
        assert!(signer.verify(&tampered, 0).is_err());
    }

    #[test]
    fn tampered_expiry_reads_as_invalid_not_expired() {
        let signer = TokenSigner::new(SECRET);
        let token = signer.sign("sess-1", 1_000);
        let parts: Vec<&str> = token.split('.').collect();
        let forged = format!("{}.{}.{}", parts[0], 9_999_999_999_i64, parts[2]);
        let err = signer.verify(&forged, 0).unwrap_err();
        assert!(err.to_string().contains("invalid"));
    }

    #[test]
    fn wrong_secret_fails() {
        let signer = TokenSigner::new(SECRET);
        let other = TokenSigner::new("ffffffffffffffffffffffffffffffff");
        let token = signer.sign("sess-1", 2_000_000_000);
        assert!(other.verify(&token, 0).is_err());
    }

    #[test]
    fn garbage_is_malformed() {
        let signer = TokenSigner::new(SECRET);
        assert!(signer.verify("", 0).is_err());
        assert!(signer.verify("a.b", 0).is_err());
        assert!(signer.verify("a.b.c.d", 0).is_err());
        assert!(signer.verify("sess.notanumber.abcd", 0).is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let signer = TokenSigner::new(SECRET);
        let debug = format!("{signer:?}");
        assert!(!debug.contains(SECRET));
        assert!(debug.contains("[redacted]"));
    }
}
