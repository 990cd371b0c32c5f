//! Authenticated XRPC calls with a single retry on expired tokens.
//!
//! Every call that needs the access token goes through
//! [`WireClient::make_authenticated_request`]. When the service answers with the
//! `ExpiredToken` error code, the session is refreshed and the call is repeated exactly
//! once with the new token. Any other failure is returned as is.

use std::sync::Arc;

use log::{debug, error, info, warn};
use reqwest::{Client, RequestBuilder, Response};

use super::models::RemoteError;
use super::session::SessionManager;
use crate::auth::build_bearer_auth_header;
use crate::error::{ConnectorError, Result};

/// Sanitizes text for safe logging by truncating and escaping control characters.
///
/// # Parameters
///
/// - `text`: The text to sanitize
/// - `max_len`: Maximum length in bytes before truncation
///
/// # Returns
///
/// A single-line string safe for logging
pub(crate) fn sanitize_for_logging(text: &str, max_len: usize) -> String {
    let sanitized: String = text
        .chars()
        .map(|c| match c {
            '\n' | '\r' | '\t' => ' ',
            c if c.is_control() => '?',
            c => c,
        })
        .collect();

    if sanitized.len() > max_len {
        let mut cut = max_len;
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        format!(
            "{}... [truncated, {} total bytes]",
            &sanitized[..cut],
            text.len()
        )
    } else {
        sanitized
    }
}

/// Turns a non-success response into an error.
///
/// Returns the error and whether the service reported an expired access token.
pub(crate) async fn read_error_response(
    operation: &str,
    response: Response,
) -> (ConnectorError, bool) {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(e) => return (ConnectorError::transport(operation, e), false),
    };

    match serde_json::from_str::<RemoteError>(&body) {
        Ok(remote) => {
            debug!("AT Protocol error for '{}': {}", operation, remote);
            let expired = remote.is_expired_token();
            (ConnectorError::remote(operation, status, remote), expired)
        }
        Err(_) => {
            debug!(
                "Error response for '{}': {}",
                operation,
                sanitize_for_logging(&body, 200)
            );
            (
                ConnectorError::HttpStatus {
                    operation: operation.to_string(),
                    status,
                    body: sanitize_for_logging(&body, 200),
                },
                false,
            )
        }
    }
}

/// Executes authenticated calls on behalf of the record publisher and media uploader.
#[derive(Clone)]
pub struct WireClient {
    session: Arc<SessionManager>,
}

impl WireClient {
    pub fn new(session: Arc<SessionManager>) -> Self {
        WireClient { session }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub(crate) fn endpoint(&self, path: &str) -> String {
        self.session.endpoint(path)
    }

    /// Sends a request built by `build` with the current access token.
    ///
    /// `build` receives the HTTP client and the full `Authorization` header value; it is
    /// called once per attempt so the retry carries the refreshed token.
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: The response body on success
    /// - `Err(ConnectorError::RefreshFailed)`: The token expired and refreshing failed
    /// - `Err(_)`: Any other failure, including a failed retry
    pub(crate) async fn make_authenticated_request<F>(
        &self,
        operation: &str,
        build: F,
    ) -> Result<String>
    where
        F: Fn(&Client, String) -> RequestBuilder,
    {
        info!("Making authenticated request for operation: {}", operation);

        let token = self.session.current_token().await?;
        let response = self.send(operation, &build, &token).await?;

        let status = response.status();
        info!(
            "Received response with status: {} for operation: {}",
            status, operation
        );

        if status.is_success() {
            return self.read_body(operation, response).await;
        }

        let (original, expired) = read_error_response(operation, response).await;
        if !expired {
            error!("Operation '{}' failed: {}", operation, original);
            return Err(original);
        }

        warn!(
            "Access token expired during '{}', refreshing session",
            operation
        );
        let refreshed = match self.session.refresh_if_current(&token).await {
            Ok(session) => session,
            Err(refresh) => {
                error!("Token refresh failed for operation '{}': {}", operation, refresh);
                return Err(ConnectorError::RefreshFailed {
                    original: Box::new(original),
                    refresh: Box::new(refresh),
                });
            }
        };

        info!("Token refreshed, retrying operation '{}'", operation);
        let retry = self
            .send(operation, &build, &refreshed.access_token)
            .await?;
        let retry_status = retry.status();
        info!(
            "Retry response status: {} for operation '{}'",
            retry_status, operation
        );

        if retry_status.is_success() {
            info!(
                "Operation '{}' completed successfully after token refresh",
                operation
            );
            return self.read_body(operation, retry).await;
        }

        let (err, _) = read_error_response(operation, retry).await;
        error!(
            "Operation '{}' failed after token refresh: {}",
            operation, err
        );
        Err(err)
    }

    async fn send<F>(&self, operation: &str, build: &F, token: &str) -> Result<Response>
    where
        F: Fn(&Client, String) -> RequestBuilder,
    {
        build(self.session.http_client(), build_bearer_auth_header(token))
            .send()
            .await
            .map_err(|e| {
                error!("Request for '{}' failed: {}", operation, e);
                ConnectorError::transport(operation, e)
            })
    }

    async fn read_body(&self, operation: &str, response: Response) -> Result<String> {
        let body = response
            .text()
            .await
            .map_err(|e| ConnectorError::transport(operation, e))?;
        debug!(
            "Response summary for '{}': {} bytes received",
            operation,
            body.len()
        );
        Ok(body)
    }
}
