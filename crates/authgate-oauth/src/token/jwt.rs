//! JWT signing and verification.
//!
//! Two kinds of JWT pass through the token endpoint:
//!
//! - tokens minted here (access tokens, ID tokens), signed with the server's
//!   [`SigningKeyPair`] through [`JwtService`];
//! - tokens minted by devices (DPoP proofs, app2app requests), which carry
//!   their own public key and are verified with [`verify_with_jwk`].

use std::collections::HashSet;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation, decode, decode_header,
    encode,
};
use p384::SecretKey;
use p384::elliptic_curve::sec1::ToEncodedPoint;
use p384::pkcs8::{EncodePrivateKey, LineEnding};
use rand::rngs::OsRng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};

use crate::error::OAuthError;

/// Algorithm of every token this server signs.
const SERVER_ALGORITHM: Algorithm = Algorithm::ES384;

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token expired")]
    Expired,

    #[error("signature does not verify")]
    InvalidSignature,

    #[error("claims rejected: {0}")]
    InvalidClaims(String),

    #[error("unusable key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

impl JwtError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }

    pub fn invalid_claims(message: impl Into<String>) -> Self {
        Self::InvalidClaims(message.into())
    }

    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey(message.into())
    }
}

impl From<jsonwebtoken::errors::Error> for JwtError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidIssuer | ErrorKind::MissingRequiredClaim(_) => {
                Self::InvalidClaims(err.to_string())
            }
            ErrorKind::InvalidEcdsaKey | ErrorKind::InvalidRsaKey(_) | ErrorKind::InvalidKeyFormat => {
                Self::InvalidKey(err.to_string())
            }
            _ => Self::Malformed(err.to_string()),
        }
    }
}

impl From<JwtError> for OAuthError {
    fn from(err: JwtError) -> Self {
        OAuthError::internal(format!("jwt: {err}"))
    }
}

/// A P-384 key the server (or, in tests, a simulated device) signs with.
pub struct SigningKeyPair {
    pub kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    jwk: Value,
}

impl SigningKeyPair {
    /// Generates a fresh ES384 key with a random `kid`.
    pub fn generate_ec() -> Result<Self, JwtError> {
        let secret = SecretKey::random(&mut OsRng);
        let point = secret.public_key().to_encoded_point(false);
        let (Some(x), Some(y)) = (point.x(), point.y()) else {
            return Err(JwtError::invalid_key("public point is compressed"));
        };
        let x = URL_SAFE_NO_PAD.encode(x.as_slice());
        let y = URL_SAFE_NO_PAD.encode(y.as_slice());

        let pem = secret
            .to_pkcs8_pem(LineEnding::LF)
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let encoding_key = EncodingKey::from_ec_pem(pem.as_bytes())?;
        let decoding_key = DecodingKey::from_ec_components(&x, &y)?;

        let kid = uuid::Uuid::new_v4().to_string();
        let jwk = json!({
            "kty": "EC",
            "crv": "P-384",
            "x": x,
            "y": y,
            "kid": kid,
            "use": "sig",
            "alg": "ES384",
        });

        Ok(Self {
            kid,
            encoding_key,
            decoding_key,
            jwk,
        })
    }

    /// The public half as a JWK.
    pub fn public_jwk_value(&self) -> Value {
        self.jwk.clone()
    }

    fn sign<T: Serialize>(&self, mut header: Header, claims: &T) -> Result<String, JwtError> {
        header.alg = SERVER_ALGORITHM;
        encode(&header, claims, &self.encoding_key).map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Signs `claims` with the public key embedded in the `jwk` header, the
    /// shape of DPoP proofs and app2app requests.
    pub fn sign_with_embedded_jwk<T: Serialize>(
        &self,
        typ: &str,
        claims: &T,
    ) -> Result<String, JwtError> {
        let jwk = serde_json::from_value(self.jwk.clone())
            .map_err(|e| JwtError::invalid_key(e.to_string()))?;
        let mut header = Header::new(SERVER_ALGORITHM);
        header.typ = Some(typ.to_string());
        header.jwk = Some(jwk);
        self.sign(header, claims)
    }
}

/// Signs and verifies tokens issued by this server.
pub struct JwtService {
    key: SigningKeyPair,
    issuer: String,
}

impl JwtService {
    pub fn new(key: SigningKeyPair, issuer: impl Into<String>) -> Self {
        Self {
            key,
            issuer: issuer.into(),
        }
    }

    /// Signs `claims`, stamping the header with the key's `kid`.
    pub fn encode<T: Serialize>(&self, claims: &T) -> Result<String, JwtError> {
        let mut header = Header::new(SERVER_ALGORITHM);
        header.kid = Some(self.key.kid.clone());
        self.key.sign(header, claims)
    }

    /// Verifies signature, issuer and expiry. Audience is left to the caller.
    pub fn decode<T: DeserializeOwned>(&self, token: &str) -> Result<TokenData<T>, JwtError> {
        let mut validation = Validation::new(SERVER_ALGORITHM);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_aud = false;
        Ok(decode(token, &self.key.decoding_key, &validation)?)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }
}

/// Decodes one segment of a compact JWS as JSON without verifying anything.
fn decode_segment(token: &str, index: usize) -> Result<Value, JwtError> {
    let mut parts = token.split('.');
    let segments = [parts.next(), parts.next(), parts.next()];
    if parts.next().is_some() || segments.iter().any(Option::is_none) {
        return Err(JwtError::malformed("expected three JWS segments"));
    }
    let segment = segments[index].unwrap_or_default();
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| JwtError::malformed(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| JwtError::malformed(e.to_string()))
}

/// Returns the protected header of a JWT as JSON, unverified.
///
/// # Errors
/// Returns an error if the token is not a well-formed compact JWS.
pub fn unverified_header(token: &str) -> Result<Value, JwtError> {
    decode_segment(token, 0)
}

/// Returns the payload of a JWT as JSON, unverified.
///
/// # Errors
/// Returns an error if the token is not a well-formed compact JWS.
pub fn unverified_payload(token: &str) -> Result<Value, JwtError> {
    decode_segment(token, 1)
}

/// Verifies a device-signed JWT against a public JWK and returns its claims.
///
/// Symmetric algorithms are refused. No registered claim is required.
///
/// # Errors
/// Returns an error if the key is unusable or the signature does not verify.
pub fn verify_with_jwk<T: DeserializeOwned>(token: &str, jwk: &Value) -> Result<T, JwtError> {
    let header = decode_header(token)?;
    if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(JwtError::invalid_key("symmetric algorithms are not accepted"));
    }

    let jwk: jsonwebtoken::jwk::Jwk =
        serde_json::from_value(jwk.clone()).map_err(|e| JwtError::invalid_key(e.to_string()))?;
    let key = DecodingKey::from_jwk(&jwk)?;

    let mut validation = Validation::new(header.alg);
    validation.required_spec_claims = HashSet::new();
    validation.validate_exp = false;
    validation.validate_aud = false;

    Ok(decode::<T>(token, &key, &validation)?.claims)
}

/// Computes the RFC 7638 SHA-256 thumbprint of a public JWK.
///
/// # Errors
/// Returns an error if the key type is unsupported or a member is missing.
pub fn jwk_thumbprint(jwk: &Value) -> Result<String, JwtError> {
    let member = |name: &str| {
        jwk.get(name)
            .and_then(Value::as_str)
            .ok_or_else(|| JwtError::invalid_key(format!("JWK is missing '{name}'")))
    };

    let canonical = match member("kty")? {
        "RSA" => json!({
            "e": member("e")?,
            "kty": "RSA",
            "n": member("n")?,
        }),
        "EC" => json!({
            "crv": member("crv")?,
            "kty": "EC",
            "x": member("x")?,
            "y": member("y")?,
        }),
        "OKP" => json!({
            "crv": member("crv")?,
            "kty": "OKP",
            "x": member("x")?,
        }),
        other => return Err(JwtError::invalid_key(format!("unsupported kty '{other}'"))),
    };

    let json = serde_json::to_string(&canonical).map_err(|e| JwtError::invalid_key(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(json.as_bytes())))
}
