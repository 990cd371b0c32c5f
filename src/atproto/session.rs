//! Session lifecycle: login and token refresh.
//!
//! The session is the only mutable state shared between publish requests. It lives
//! behind a [`RwLock`]; refreshes are single-flight behind a separate [`Mutex`] so two
//! requests that hit an expired token at the same time trigger one refresh call.

use std::time::Duration;

use log::{debug, error, info, warn};
use reqwest::{Client, RequestBuilder};
use tokio::sync::{Mutex, RwLock};

use super::api::read_error_response;
use super::models::{CreateSessionRequest, Session};
use crate::auth::build_bearer_auth_header;
use crate::config::mask_secret;
use crate::error::{ConnectorError, Result};

pub const DEFAULT_BASE_URL: &str = "https://bsky.social";
pub const CREATE_SESSION_ENDPOINT: &str = "/xrpc/com.atproto.server.createSession";
pub const REFRESH_SESSION_ENDPOINT: &str = "/xrpc/com.atproto.server.refreshSession";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Owns the account identity and its access/refresh token pair.
pub struct SessionManager {
    base_url: String,
    client: Client,
    session: RwLock<Option<Session>>,
    refresh_gate: Mutex<()>,
}

impl SessionManager {
    /// Creates an unauthenticated manager for the given PDS host.
    ///
    /// An empty `base_url` selects [`DEFAULT_BASE_URL`].
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConnectorError::transport("build_http_client", e))?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: &str, client: Client) -> Self {
        let base_url = if base_url.is_empty() {
            DEFAULT_BASE_URL
        } else {
            base_url
        };
        SessionManager {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            session: RwLock::new(None),
            refresh_gate: Mutex::new(()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchanges credentials for a token pair and stores it.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<Session> {
        info!("Creating session for {}", identifier);
        debug!("App password (masked): {}", mask_secret(password));

        let request = self
            .client
            .post(self.endpoint(CREATE_SESSION_ENDPOINT))
            .json(&CreateSessionRequest {
                identifier,
                password,
            });

        let session = self
            .exchange("create_session", request)
            .await
            .map_err(|e| {
                error!("Failed to create session for {}: {}", identifier, e);
                e
            })?;

        info!(
            "Authenticated as {} ({})",
            session.account_handle, session.account_id
        );
        *self.session.write().await = Some(session.clone());
        Ok(session)
    }

    /// Exchanges the stored refresh token for a new token pair.
    ///
    /// Fails with [`ConnectorError::NoRefreshToken`] if no login has happened yet. A
    /// failed refresh leaves the stored session untouched.
    pub async fn refresh(&self) -> Result<Session> {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Refreshes only if `stale_token` is still the current access token.
    ///
    /// When another task already refreshed while this one waited on the gate, the
    /// session it obtained is returned without a second refresh call.
    pub(crate) async fn refresh_if_current(&self, stale_token: &str) -> Result<Session> {
        let _gate = self.refresh_gate.lock().await;

        if let Some(session) = self.session.read().await.as_ref() {
            if session.access_token != stale_token {
                debug!("Session already refreshed by a concurrent request");
                return Ok(session.clone());
            }
        }

        self.refresh_locked().await
    }

    async fn refresh_locked(&self) -> Result<Session> {
        let refresh_token = match self.session.read().await.as_ref() {
            Some(session) => session.refresh_token.clone(),
            None => {
                warn!("Refresh requested before any login");
                return Err(ConnectorError::NoRefreshToken);
            }
        };

        info!("Refreshing session");
        debug!("Refresh token (masked): {}", mask_secret(&refresh_token));

        let request = self
            .client
            .post(self.endpoint(REFRESH_SESSION_ENDPOINT))
            .header("Authorization", build_bearer_auth_header(&refresh_token));

        let session = self
            .exchange("refresh_session", request)
            .await
            .map_err(|e| {
                error!("Failed to refresh session: {}", e);
                e
            })?;

        let mut guard = self.session.write().await;
        let old_token = guard
            .as_ref()
            .map(|s| mask_secret(&s.access_token))
            .unwrap_or_default();
        *guard = Some(session.clone());
        info!(
            "Session refreshed successfully (old token {}, new token {})",
            old_token,
            mask_secret(&session.access_token)
        );

        Ok(session)
    }

    async fn exchange(&self, operation: &'static str, request: RequestBuilder) -> Result<Session> {
        let auth_err = |source: ConnectorError| ConnectorError::Auth {
            operation,
            source: Box::new(source),
        };

        let response = request
            .send()
            .await
            .map_err(|e| auth_err(ConnectorError::transport(operation, e)))?;

        let status = response.status();
        debug!("Received status {} for {}", status, operation);

        if !status.is_success() {
            let (err, _) = read_error_response(operation, response).await;
            return Err(auth_err(err));
        }

        let body = response
            .text()
            .await
            .map_err(|e| auth_err(ConnectorError::transport(operation, e)))?;
        serde_json::from_str::<Session>(&body)
            .map_err(|e| auth_err(ConnectorError::decode(operation, e)))
    }

    /// True iff an access token is present. Expiry is only detected reactively.
    pub async fn is_authenticated(&self) -> bool {
        self.session.read().await.is_some()
    }

    /// The access token to put on the next outbound call.
    pub async fn current_token(&self) -> Result<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.access_token.clone())
            .ok_or(ConnectorError::NotAuthenticated)
    }

    /// The account DID, used as the `repo` of created records.
    pub async fn account_id(&self) -> Result<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.account_id.clone())
            .ok_or(ConnectorError::NotAuthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session_body(access: &str, refresh: &str) -> serde_json::Value {
        json!({
            "accessJwt": access,
            "refreshJwt": refresh,
            "did": "did:plc:testbot",
            "handle": "testbot.bsky.social"
        })
    }

    #[tokio::test]
    async fn test_login_stores_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_SESSION_ENDPOINT))
            .and(body_json(json!({"identifier": "testbot.bsky.social", "password": "app-pass"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("access-1", "refresh-1")))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionManager::new(&server.uri()).unwrap();
        assert!(!manager.is_authenticated().await);

        let session = manager.login("testbot.bsky.social", "app-pass").await.unwrap();
        assert_eq!(session.account_id, "did:plc:testbot");
        assert_eq!(session.account_handle, "testbot.bsky.social");
        assert!(manager.is_authenticated().await);
        assert_eq!(manager.current_token().await.unwrap(), "access-1");
        assert_eq!(manager.account_id().await.unwrap(), "did:plc:testbot");
    }

    #[tokio::test]
    async fn test_login_failure_is_auth_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "error": "AuthenticationRequired",
                "message": "Invalid identifier or password"
            })))
            .mount(&server)
            .await;

        let manager = SessionManager::new(&server.uri()).unwrap();
        let err = manager.login("testbot", "wrong").await.unwrap_err();

        assert!(matches!(err, ConnectorError::Auth { operation: "create_session", .. }));
        assert_eq!(err.remote_code(), Some("AuthenticationRequired"));
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_refresh_without_login_fails() {
        let manager = SessionManager::new("http://127.0.0.1:9").unwrap();
        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, ConnectorError::NoRefreshToken));
        assert!(matches!(
            manager.current_token().await,
            Err(ConnectorError::NotAuthenticated)
        ));
    }

    #[tokio::test]
    async fn test_refresh_replaces_both_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("access-1", "refresh-1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_SESSION_ENDPOINT))
            .and(header("Authorization", "Bearer refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("access-2", "refresh-2")))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionManager::new(&server.uri()).unwrap();
        manager.login("testbot", "app-pass").await.unwrap();

        let session = manager.refresh().await.unwrap();
        assert_eq!(session.access_token, "access-2");
        assert_eq!(session.refresh_token, "refresh-2");
        assert_eq!(manager.current_token().await.unwrap(), "access-2");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_previous_session() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("access-1", "refresh-1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "ExpiredToken",
                "message": "Token has been revoked"
            })))
            .mount(&server)
            .await;

        let manager = SessionManager::new(&server.uri()).unwrap();
        manager.login("testbot", "app-pass").await.unwrap();

        let err = manager.refresh().await.unwrap_err();
        assert!(matches!(err, ConnectorError::Auth { operation: "refresh_session", .. }));
        assert!(manager.is_authenticated().await);
        assert_eq!(manager.current_token().await.unwrap(), "access-1");
    }

    #[tokio::test]
    async fn test_stale_refresh_reuses_newer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(CREATE_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("access-1", "refresh-1")))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(REFRESH_SESSION_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(session_body("access-2", "refresh-2")))
            .expect(1)
            .mount(&server)
            .await;

        let manager = SessionManager::new(&server.uri()).unwrap();
        manager.login("testbot", "app-pass").await.unwrap();

        let first = manager.refresh_if_current("access-1").await.unwrap();
        let second = manager.refresh_if_current("access-1").await.unwrap();
        assert_eq!(first.access_token, "access-2");
        assert_eq!(second.access_token, "access-2");
    }
}
