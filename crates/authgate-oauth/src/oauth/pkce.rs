//! PKCE (Proof Key for Code Exchange), RFC 7636.
//!
//! Only the S256 transform is accepted.
//!
//! ```
//! use authgate_oauth::oauth::pkce::{PkceVerifier, compute_s256_challenge};
//!
//! let verifier = PkceVerifier::new("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk").unwrap();
//! let challenge = compute_s256_challenge(verifier.as_str());
//! assert!(verifier.verify(&challenge).is_ok());
//! ```

use std::ops::RangeInclusive;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};

use crate::error::OAuthError;
use crate::oauth::secret::constant_time_eq;

/// The only `code_challenge_method` the endpoint accepts.
pub const S256: &str = "S256";

const VERIFIER_LENGTH: RangeInclusive<usize> = 43..=128;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PkceError {
    /// Wrong length, or a character outside `[A-Za-z0-9-._~]`.
    #[error("malformed code verifier")]
    MalformedVerifier,

    #[error("code verifier does not match challenge")]
    Mismatch,
}

/// Any PKCE failure at the token endpoint means the code cannot be redeemed.
impl From<PkceError> for OAuthError {
    fn from(_: PkceError) -> Self {
        OAuthError::invalid_grant("invalid authorization code")
    }
}

pub fn is_supported_method(method: &str) -> bool {
    method == S256
}

/// A code verifier that passed the RFC 7636 syntax check.
#[derive(Debug, Clone)]
pub struct PkceVerifier(String);

impl PkceVerifier {
    pub fn new(verifier: impl Into<String>) -> Result<Self, PkceError> {
        let verifier = verifier.into();
        let unreserved = |b: u8| b.is_ascii_alphanumeric() || b"-._~".contains(&b);
        if !VERIFIER_LENGTH.contains(&verifier.len()) || !verifier.bytes().all(unreserved) {
            return Err(PkceError::MalformedVerifier);
        }
        Ok(Self(verifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks the verifier against a stored S256 challenge. An empty
    /// challenge never verifies.
    pub fn verify(&self, challenge: &str) -> Result<(), PkceError> {
        if challenge.is_empty() || !constant_time_eq(&compute_s256_challenge(&self.0), challenge) {
            return Err(PkceError::Mismatch);
        }
        Ok(())
    }
}

/// `BASE64URL(SHA256(ASCII(verifier)))`
pub fn compute_s256_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 Appendix B
    const RFC_VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const RFC_CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn test_rfc7636_test_vector() {
        assert_eq!(compute_s256_challenge(RFC_VERIFIER), RFC_CHALLENGE);
        assert!(PkceVerifier::new(RFC_VERIFIER).unwrap().verify(RFC_CHALLENGE).is_ok());
    }

    #[test]
    fn test_mismatch_and_empty_challenge() {
        let verifier = PkceVerifier::new("a".repeat(43)).unwrap();
        assert_eq!(verifier.verify(RFC_CHALLENGE), Err(PkceError::Mismatch));
        assert_eq!(verifier.verify(""), Err(PkceError::Mismatch));
    }

    #[test]
    fn test_verifier_syntax() {
        assert_eq!(
            PkceVerifier::new("a".repeat(42)).unwrap_err(),
            PkceError::MalformedVerifier
        );
        assert!(PkceVerifier::new("a".repeat(43)).is_ok());
        assert!(PkceVerifier::new("a".repeat(128)).is_ok());
        assert!(PkceVerifier::new("a".repeat(129)).is_err());
        assert!(PkceVerifier::new(format!("{}+", "a".repeat(43))).is_err());
        assert!(PkceVerifier::new(format!("{}-._~", "a".repeat(40))).is_ok());
    }

    #[test]
    fn test_pkce_failure_is_invalid_grant() {
        let err: OAuthError = PkceError::MalformedVerifier.into();
        assert_eq!(err.oauth_error_code(), "invalid_grant");
        assert_eq!(err.public_description(), "invalid authorization code");
    }

    #[test]
    fn test_supported_method() {
        assert!(is_supported_method("S256"));
        assert!(!is_supported_method("plain"));
        assert!(!is_supported_method(""));
    }
}
