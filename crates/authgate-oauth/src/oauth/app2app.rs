//! App2app request JWTs.
//!
//! A device proves possession of its app2app key by signing a JWT over a
//! server-issued challenge. The public key travels in the `jwk` header, so the
//! token can be read before the key is trusted; trust comes from comparing
//! that key with the one bound to the offline grant.

use serde::Deserialize;
use serde_json::Value;

use crate::token::jwt::{JwtError, unverified_header, unverified_payload, verify_with_jwk};

/// JWT `typ` of an app2app request.
pub const APP2APP_JWT_TYPE: &str = "vnd.authgear.app2app-request";

/// A parsed app2app request.
#[derive(Debug, Clone, PartialEq)]
pub struct App2AppRequest {
    /// Public JWK from the header.
    pub key: Value,
    /// Challenge the request answers.
    pub challenge: String,
}

#[derive(Debug, Deserialize)]
struct App2AppClaims {
    challenge: String,
}

fn read_key(token: &str) -> Result<Value, JwtError> {
    let header = unverified_header(token)?;
    if header.get("typ").and_then(Value::as_str) != Some(APP2APP_JWT_TYPE) {
        return Err(JwtError::invalid_claims(format!(
            "typ must be '{APP2APP_JWT_TYPE}'"
        )));
    }
    match header.get("jwk") {
        Some(key @ Value::Object(members)) if !members.contains_key("d") => Ok(key.clone()),
        _ => Err(JwtError::invalid_key("header must carry a public jwk")),
    }
}

/// Reads an app2app request without checking its signature.
///
/// # Errors
///
/// Returns an error if the header or payload is malformed.
pub fn parse_request_unverified(token: &str) -> Result<App2AppRequest, JwtError> {
    let key = read_key(token)?;
    let claims: App2AppClaims = serde_json::from_value(unverified_payload(token)?)
        .map_err(|e| JwtError::invalid_claims(e.to_string()))?;
    if claims.challenge.is_empty() {
        return Err(JwtError::invalid_claims("challenge is required"));
    }
    Ok(App2AppRequest {
        key,
        challenge: claims.challenge,
    })
}

/// Reads an app2app request and checks that `key` signed it.
///
/// # Errors
///
/// Returns an error if the token is malformed or the signature does not
/// verify under `key`.
pub fn parse_request(token: &str, key: &Value) -> Result<App2AppRequest, JwtError> {
    let embedded = read_key(token)?;
    let claims: App2AppClaims = verify_with_jwk(token, key)?;
    Ok(App2AppRequest {
        key: embedded,
        challenge: claims.challenge,
    })
}
