//! # Authentication Module
//!
//! Bearer-token authentication for the `/api/v1` routes.
//!
//! ## Usage
//!
//! Send the token in the Authorization header:
//! ```text
//! Authorization: Bearer <token>
//! ```
//! or, where headers cannot be set, as a query parameter: `?token=<token>`.
//!
//! The middleware is the only place a credential is turned into an
//! identity. Handlers receive the result as `Extension<Authenticated>` and
//! never see the raw credential.

use super::{AppState, run_blocking, types::ApiError};
use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, Uri, header},
    middleware::Next,
    response::Response,
};
use pottytrainer_core::{ExternalSubject, IdentityVerifier, PottyError};
use serde::Deserialize;

// =============================================================================
// EXTERNAL SIGN-IN
// =============================================================================

/// Verifier used until a provider is configured. Rejects every assertion.
#[derive(Debug, Clone, Copy, Default)]
pub struct RejectingVerifier;

impl IdentityVerifier for RejectingVerifier {
    fn provider(&self) -> &str {
        "unconfigured"
    }

    fn verify(&self, _assertion: &str) -> Result<ExternalSubject, PottyError> {
        Err(PottyError::Unauthorized)
    }
}

// =============================================================================
// CREDENTIAL EXTRACTION
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Pull the presented credential from a request.
///
/// The Authorization header wins over the query string. Both
/// `Bearer <token>` (scheme in any case) and a raw `<token>` header value
/// are accepted.
pub fn credential_from_parts(headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(|value| strip_bearer(value).trim())
        .filter(|value| !value.is_empty());
    if let Some(credential) = from_header {
        return Some(credential.to_string());
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.trim().is_empty())
}

fn strip_bearer(value: &str) -> &str {
    match value.split_once(' ') {
        Some((scheme, rest)) if scheme.eq_ignore_ascii_case("bearer") => rest,
        _ => value,
    }
}

// =============================================================================
// MIDDLEWARE
// =============================================================================

/// Token authentication middleware.
///
/// Resolves the credential through the core's auth gate and attaches the
/// resulting `Authenticated` to the request. Any failure to authenticate
/// ends the request with 401; a store failure ends it with 503/504.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let credential = credential_from_parts(request.headers(), request.uri());
    if credential.is_none() {
        tracing::warn!(
            event = "auth_failure",
            reason = "missing_credential",
            "Missing credential"
        );
    }

    let auth = run_blocking(&state, move |backend, ctx| {
        backend.gate().require(ctx, credential.as_deref())
    })
    .await?;

    tracing::debug!(user_id = %auth.user_id(), "authenticated request");
    request.extensions_mut().insert(auth);
    Ok(next.run(request).await)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn bearer_header() {
        let uri: Uri = "/api/v1/eats".parse().unwrap();
        assert_eq!(
            credential_from_parts(&headers("Bearer abc"), &uri).as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn bearer_scheme_is_case_insensitive() {
        let uri: Uri = "/api/v1/eats".parse().unwrap();
        for value in ["bearer abc", "BEARER abc", "BeArEr  abc"] {
            assert_eq!(
                credential_from_parts(&headers(value), &uri).as_deref(),
                Some("abc"),
                "{value}"
            );
        }
    }

    #[test]
    fn raw_header() {
        let uri: Uri = "/api/v1/eats".parse().unwrap();
        assert_eq!(
            credential_from_parts(&headers("abc"), &uri).as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn header_wins_over_query() {
        let uri: Uri = "/api/v1/eats?token=from-query".parse().unwrap();
        assert_eq!(
            credential_from_parts(&headers("Bearer from-header"), &uri).as_deref(),
            Some("from-header")
        );
    }

    #[test]
    fn query_fallback() {
        let uri: Uri = "/api/v1/eats?token=xyz".parse().unwrap();
        assert_eq!(
            credential_from_parts(&HeaderMap::new(), &uri).as_deref(),
            Some("xyz")
        );
    }

    #[test]
    fn nothing_presented() {
        let uri: Uri = "/api/v1/eats".parse().unwrap();
        assert!(credential_from_parts(&HeaderMap::new(), &uri).is_none());
        assert!(credential_from_parts(&headers("Bearer "), &uri).is_none());
    }

    #[test]
    fn rejecting_verifier_rejects() {
        let verifier = RejectingVerifier;
        assert!(matches!(
            verifier.verify("anything"),
            Err(PottyError::Unauthorized)
        ));
    }
}
