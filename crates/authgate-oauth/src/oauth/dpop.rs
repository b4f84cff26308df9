//! DPoP proof verification (RFC 9449).
//!
//! The token endpoint only needs the thumbprint (JKT) of the key that signed
//! the proof. Codes and device secrets bound to a JKT are then compared
//! against it by the grant handlers.

use serde::Deserialize;
use serde_json::Value;
use time::{Duration, OffsetDateTime};
use url::Url;

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::token::jwt::{jwk_thumbprint, unverified_header, verify_with_jwk};

/// JWT `typ` every DPoP proof must carry.
pub const DPOP_JWT_TYPE: &str = "dpop+jwt";

/// Accepted distance between the proof's `iat` and the server clock.
pub const MAX_CLOCK_SKEW: Duration = Duration::seconds(60);

/// A verified DPoP proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DpopProof {
    /// RFC 7638 thumbprint of the proof key.
    pub jkt: String,
    /// Unique proof ID.
    pub jti: String,
    /// When the proof was created.
    pub issued_at: OffsetDateTime,
}

#[derive(Debug, Deserialize)]
struct DpopClaims {
    jti: String,
    htm: String,
    htu: String,
    iat: i64,
}

/// Strips query and fragment so `htu` comparisons ignore them.
fn normalize_htu(uri: &str) -> OAuthResult<String> {
    let mut url = Url::parse(uri)
        .map_err(|e| OAuthError::invalid_dpop_proof(format!("invalid htu '{uri}': {e}")))?;
    url.set_query(None);
    url.set_fragment(None);
    Ok(url.to_string())
}

/// Error for a code, refresh token or device secret presented with the
/// wrong DPoP key (or without one).
pub(crate) fn invalid_dpop_key_binding() -> OAuthError {
    OAuthError::invalid_dpop_proof("invalid DPoP key binding")
}

/// Verifies a DPoP proof for a request and returns its key thumbprint.
///
/// # Errors
///
/// Returns `invalid_dpop_proof` if the header, signature, HTTP binding or
/// timestamp is wrong.
pub fn verify_dpop_proof(
    proof: &str,
    method: &str,
    uri: &str,
    now: OffsetDateTime,
) -> OAuthResult<DpopProof> {
    let header = unverified_header(proof)
        .map_err(|e| OAuthError::invalid_dpop_proof(format!("malformed proof: {e}")))?;

    if header.get("typ").and_then(Value::as_str) != Some(DPOP_JWT_TYPE) {
        return Err(OAuthError::invalid_dpop_proof("typ must be dpop+jwt"));
    }
    let jwk = header
        .get("jwk")
        .filter(|jwk| jwk.is_object())
        .ok_or_else(|| OAuthError::invalid_dpop_proof("jwk header is required"))?;
    if jwk.get("d").is_some() {
        return Err(OAuthError::invalid_dpop_proof("jwk must be a public key"));
    }

    let claims: DpopClaims = verify_with_jwk(proof, jwk)
        .map_err(|e| OAuthError::invalid_dpop_proof(format!("invalid proof: {e}")))?;

    if !claims.htm.eq_ignore_ascii_case(method) {
        return Err(OAuthError::invalid_dpop_proof("htm does not match request method"));
    }
    if normalize_htu(&claims.htu)? != normalize_htu(uri)? {
        return Err(OAuthError::invalid_dpop_proof("htu does not match request URI"));
    }

    let issued_at = OffsetDateTime::from_unix_timestamp(claims.iat)
        .map_err(|_| OAuthError::invalid_dpop_proof("iat is out of range"))?;
    if (now - issued_at).abs() > MAX_CLOCK_SKEW {
        return Err(OAuthError::invalid_dpop_proof("iat is outside the accepted window"));
    }

    let jkt = jwk_thumbprint(jwk)
        .map_err(|e| OAuthError::invalid_dpop_proof(format!("invalid jwk: {e}")))?;

    Ok(DpopProof {
        jkt,
        jti: claims.jti,
        issued_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::jwt::SigningKeyPair;
    use serde_json::json;

    const TOKEN_URL: &str = "https://auth.example.com/oauth2/token";

    fn proof(key: &SigningKeyPair, typ: &str, htm: &str, htu: &str, iat: i64) -> String {
        key.sign_with_embedded_jwk(
            typ,
            &json!({"jti": "j1", "htm": htm, "htu": htu, "iat": iat}),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_proof_yields_thumbprint() {
        let key = SigningKeyPair::generate_ec().unwrap();
        let now = OffsetDateTime::now_utc();
        let jwt = proof(&key, DPOP_JWT_TYPE, "POST", TOKEN_URL, now.unix_timestamp());

        let verified = verify_dpop_proof(&jwt, "POST", TOKEN_URL, now).unwrap();
        assert_eq!(verified.jti, "j1");
        assert_eq!(verified.jkt, jwk_thumbprint(&key.public_jwk_value()).unwrap());
    }

    #[test]
    fn test_query_is_ignored_in_htu() {
        let key = SigningKeyPair::generate_ec().unwrap();
        let now = OffsetDateTime::now_utc();
        let jwt = proof(&key, DPOP_JWT_TYPE, "POST", TOKEN_URL, now.unix_timestamp());

        let uri = format!("{TOKEN_URL}?foo=bar");
        assert!(verify_dpop_proof(&jwt, "post", &uri, now).is_ok());
    }

    #[test]
    fn test_wrong_typ_rejected() {
        let key = SigningKeyPair::generate_ec().unwrap();
        let now = OffsetDateTime::now_utc();
        let jwt = proof(&key, "JWT", "POST", TOKEN_URL, now.unix_timestamp());

        let err = verify_dpop_proof(&jwt, "POST", TOKEN_URL, now).unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_dpop_proof");
    }

    #[test]
    fn test_http_binding_mismatch_rejected() {
        let key = SigningKeyPair::generate_ec().unwrap();
        let now = OffsetDateTime::now_utc();
        let jwt = proof(&key, DPOP_JWT_TYPE, "GET", TOKEN_URL, now.unix_timestamp());
        assert!(verify_dpop_proof(&jwt, "POST", TOKEN_URL, now).is_err());

        let jwt = proof(
            &key,
            DPOP_JWT_TYPE,
            "POST",
            "https://evil.example.com/token",
            now.unix_timestamp(),
        );
        assert!(verify_dpop_proof(&jwt, "POST", TOKEN_URL, now).is_err());
    }

    #[test]
    fn test_stale_proof_rejected() {
        let key = SigningKeyPair::generate_ec().unwrap();
        let now = OffsetDateTime::now_utc();
        let jwt = proof(
            &key,
            DPOP_JWT_TYPE,
            "POST",
            TOKEN_URL,
            now.unix_timestamp() - 3600,
        );

        assert!(verify_dpop_proof(&jwt, "POST", TOKEN_URL, now).is_err());
    }

    #[test]
    fn test_garbage_rejected() {
        let err = verify_dpop_proof("garbage", "POST", TOKEN_URL, OffsetDateTime::now_utc())
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_dpop_proof");
    }
}
