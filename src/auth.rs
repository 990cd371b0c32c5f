//! Authentication helpers.
//!
//! Outbound: bearer `Authorization` headers for XRPC calls.
//! Inbound: the `X-API-Key` gate in front of the publish endpoints.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use log::{debug, warn};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::config::mask_secret;
use crate::handlers::AppState;

/// Header carrying the shared service secret.
pub const API_KEY_HEADER: &str = "X-API-Key";

/// Builds the Authorization header value for an XRPC call.
///
/// # Example
///
/// ```rust
/// use bluesky_connector::build_bearer_auth_header;
///
/// let header = build_bearer_auth_header("your_access_jwt");
/// assert_eq!(header, "Bearer your_access_jwt");
/// ```
pub fn build_bearer_auth_header(token: &str) -> String {
    format!("Bearer {}", token)
}

/// The configured API key, held only as a SHA-256 digest.
#[derive(Clone)]
pub struct ApiKey {
    digest: [u8; 32],
}

impl ApiKey {
    pub fn new(key: &str) -> Self {
        ApiKey {
            digest: Sha256::digest(key.as_bytes()).into(),
        }
    }

    /// Compares digests so the check does not depend on the key's length or prefix.
    pub fn matches(&self, candidate: &str) -> bool {
        let candidate: [u8; 32] = Sha256::digest(candidate.as_bytes()).into();
        self.digest
            .iter()
            .zip(candidate.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Rejects requests without a valid `X-API-Key` header.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if provided.is_empty() {
        warn!("Request without API key");
        return unauthorized("Missing API key");
    }

    if !state.api_key.matches(provided) {
        warn!("Invalid API key: {}", mask_secret(provided));
        return unauthorized("Invalid API key");
    }

    debug!("API key validated successfully");
    next.run(request).await
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_bearer_auth_header() {
        assert_eq!(build_bearer_auth_header("abc"), "Bearer abc");
    }

    #[test]
    fn test_api_key_matches_only_exact_key() {
        let key = ApiKey::new("s3cret-key");
        assert!(key.matches("s3cret-key"));
        assert!(!key.matches("s3cret-key "));
        assert!(!key.matches("s3cret"));
        assert!(!key.matches(""));
    }
}
