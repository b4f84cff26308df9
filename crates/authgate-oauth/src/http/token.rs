//! Token endpoint handler.
//!
//! ```ignore
//! POST /oauth2/token
//! Content-Type: application/x-www-form-urlencoded
//! DPoP: <proof>
//!
//! grant_type=refresh_token
//! &client_id=mobile
//! &refresh_token=...
//! ```
//!
//! A session the caller is already signed in with is read from the request
//! extensions as a [`CallerSession`], placed there by session middleware.

use std::sync::Arc;

use axum::{
    Extension, Form, Json, Router,
    extract::{State, rejection::FormRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use serde_json::json;
use time::OffsetDateTime;

use crate::OAuthResult;
use crate::error::OAuthError;
use crate::handler::{RequestContext, TokenHandler};
use crate::oauth::dpop::{DpopProof, verify_dpop_proof};
use crate::oauth::token::{TokenRequest, TokenResponse};
use crate::types::CallerSession;

/// Route of the token endpoint.
pub const TOKEN_ENDPOINT_PATH: &str = "/oauth2/token";

const DPOP_HEADER: &str = "dpop";
const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

/// State shared by token endpoint requests.
#[derive(Clone)]
pub struct TokenEndpointState {
    handler: Arc<TokenHandler>,
    endpoint_uri: String,
}

impl TokenEndpointState {
    /// Creates the state. `issuer` is the public base URL; DPoP proofs must
    /// name `<issuer>/oauth2/token` as their target.
    pub fn new(handler: Arc<TokenHandler>, issuer: &str) -> Self {
        Self {
            handler,
            endpoint_uri: format!("{}{TOKEN_ENDPOINT_PATH}", issuer.trim_end_matches('/')),
        }
    }
}

/// Builds a router serving the token endpoint.
pub fn router(state: TokenEndpointState) -> Router {
    Router::new()
        .route(TOKEN_ENDPOINT_PATH, post(token_handler))
        .with_state(state)
}

/// OAuth 2.0 token endpoint handler.
pub async fn token_handler(
    State(state): State<TokenEndpointState>,
    session: Option<Extension<CallerSession>>,
    headers: HeaderMap,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let request = match form {
        Ok(Form(request)) => request,
        Err(rejection) => return token_error_response(&form_rejection_error(&rejection)),
    };

    let ctx = match request_context(&headers, &state.endpoint_uri, session) {
        Ok(ctx) => ctx,
        Err(err) => return token_error_response(&err),
    };

    match state.handler.handle(&request, &ctx).await {
        Ok(resp) => token_success_response(resp),
        Err(err) => token_error_response(&err),
    }
}

fn form_rejection_error(rejection: &FormRejection) -> OAuthError {
    tracing::debug!(error = %rejection, "malformed token request");
    OAuthError::invalid_request(format!("malformed token request: {}", rejection.body_text()))
}

fn request_context(
    headers: &HeaderMap,
    endpoint_uri: &str,
    session: Option<Extension<CallerSession>>,
) -> OAuthResult<RequestContext> {
    let dpop_proof = dpop_proof(headers, endpoint_uri)?;

    let remote_ip = header_str(headers, FORWARDED_FOR_HEADER)
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());
    let user_agent = header_str(headers, header::USER_AGENT.as_str()).map(str::to_string);

    Ok(RequestContext {
        dpop_proof,
        remote_ip,
        user_agent,
        session: session.map(|Extension(s)| s),
    })
}

fn dpop_proof(headers: &HeaderMap, endpoint_uri: &str) -> OAuthResult<Option<DpopProof>> {
    let Some(value) = headers.get(DPOP_HEADER) else {
        return Ok(None);
    };
    let proof = value
        .to_str()
        .map_err(|_| OAuthError::invalid_dpop_proof("malformed DPoP header"))?;
    verify_dpop_proof(proof, "POST", endpoint_uri, OffsetDateTime::now_utc()).map(Some)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn token_success_response(response: TokenResponse) -> Response {
    (
        StatusCode::OK,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(response),
    )
        .into_response()
}

fn token_error_response(error: &OAuthError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = json!({
        "error": error.oauth_error_code(),
        "error_description": error.public_description(),
    });

    (
        status,
        [
            (header::CACHE_CONTROL, "no-store"),
            (header::PRAGMA, "no-cache"),
        ],
        Json(body),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::extract::FromRequest;
    use axum::http::{HeaderValue, Request};

    #[test]
    fn test_request_context_without_dpop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            FORWARDED_FOR_HEADER,
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert(header::USER_AGENT, HeaderValue::from_static("sdk/1.0"));

        let ctx =
            request_context(&headers, "https://auth.example.com/oauth2/token", None).unwrap();
        assert!(ctx.dpop_proof.is_none());
        assert_eq!(ctx.remote_ip.as_deref(), Some("203.0.113.7"));
        assert_eq!(ctx.user_agent.as_deref(), Some("sdk/1.0"));
        assert!(ctx.session.is_none());
    }

    #[test]
    fn test_malformed_dpop_header_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(DPOP_HEADER, HeaderValue::from_static("not-a-jwt"));

        let err = request_context(&headers, "https://auth.example.com/oauth2/token", None)
            .unwrap_err();
        assert_eq!(err.oauth_error_code(), "invalid_dpop_proof");
    }

    #[test]
    fn test_error_response_status_and_headers() {
        let resp = token_error_response(&OAuthError::invalid_client("invalid client ID"));
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
        assert_eq!(resp.headers()[header::PRAGMA], "no-cache");

        let resp = token_error_response(&OAuthError::storage("connection reset"));
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_unparsable_form_is_invalid_request() {
        let requests = [
            Request::post(TOKEN_ENDPOINT_PATH)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"grant_type":"refresh_token"}"#))
                .unwrap(),
            Request::post(TOKEN_ENDPOINT_PATH)
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .body(Body::from("grant_type=refresh_token&grant_type=password"))
                .unwrap(),
        ];

        for req in requests {
            let rejection = Form::<TokenRequest>::from_request(req, &()).await.unwrap_err();
            let err = form_rejection_error(&rejection);
            assert_eq!(err.oauth_error_code(), "invalid_request");

            let resp = token_error_response(&err);
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert_eq!(resp.headers()[header::CACHE_CONTROL], "no-store");
            let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body["error"], "invalid_request");
            assert!(
                body["error_description"]
                    .as_str()
                    .unwrap()
                    .starts_with("malformed token request")
            );
        }
    }
}
