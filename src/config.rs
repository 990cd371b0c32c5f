//! Configuration module for the bluesky-connector service.
//!
//! This module contains the configuration structure, environment variable handling
//! and logger setup for the service.

use log::{debug, info, warn};
use std::env;

use crate::atproto::session::DEFAULT_BASE_URL;
use crate::error::{ConnectorError, Result};

pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Masks a secret for logging, keeping only its first four characters.
///
/// # Example
///
/// ```rust
/// use bluesky_connector::mask_secret;
///
/// assert_eq!(mask_secret("abcdefgh"), "abcd...");
/// assert_eq!(mask_secret("ab"), "...");
/// ```
pub fn mask_secret(secret: &str) -> String {
    if secret.chars().count() <= 4 {
        return "...".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}...", prefix)
}

/// Configuration for the connector service.
///
/// Holds the Bluesky account credentials used for the session, the shared API key
/// guarding the publish endpoints, and server/logging settings.
#[derive(Clone)]
pub struct ConnectorConfig {
    /// Account handle or DID used to log in
    pub handle: String,
    /// App password for the account
    pub app_password: String,
    /// Shared secret expected in the `X-API-Key` header
    pub api_key: String,
    /// Port the HTTP server listens on
    pub port: u16,
    /// Default log filter for env_logger
    pub log_level: String,
    /// PDS host for XRPC calls
    pub base_url: String,
}

impl std::fmt::Debug for ConnectorConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorConfig")
            .field("handle", &self.handle)
            .field("app_password", &mask_secret(&self.app_password))
            .field("api_key", &mask_secret(&self.api_key))
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn env_or(key: &str, default: &str) -> String {
    match env::var(key) {
        Ok(value) if !value.is_empty() => value,
        _ => default.to_string(),
    }
}

impl ConnectorConfig {
    /// Creates a new `ConnectorConfig` from environment variables.
    ///
    /// A `.env` file in the working directory is loaded first, if present.
    ///
    /// # Environment Variables
    ///
    /// - `BLUESKY_HANDLE`: Account handle (required, see [`ConnectorConfig::validate`])
    /// - `BLUESKY_APP_PASSWORD`: App password (required)
    /// - `SERVER_API_KEY`: API key for the publish endpoints (required)
    /// - `SERVER_PORT`: Server port (defaults to 8080)
    /// - `LOG_LEVEL`: Default log level (defaults to `info`)
    /// - `BLUESKY_BASE_URL`: PDS host (defaults to `https://bsky.social`)
    pub fn from_env() -> Self {
        if dotenvy::dotenv().is_err() {
            debug!("No .env file found, using environment variables");
        }

        let config = ConnectorConfig {
            handle: env_or("BLUESKY_HANDLE", ""),
            app_password: env_or("BLUESKY_APP_PASSWORD", ""),
            api_key: env_or("SERVER_API_KEY", ""),
            port: get_server_port(),
            log_level: env_or("LOG_LEVEL", DEFAULT_LOG_LEVEL),
            base_url: env_or("BLUESKY_BASE_URL", DEFAULT_BASE_URL),
        };

        debug!("Loaded configuration: {:?}", config);
        config
    }

    /// Checks that every required setting is present.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: If the configuration is complete
    /// - `Err(ConnectorError::Validation)`: Naming the first missing variable
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("BLUESKY_HANDLE", &self.handle),
            ("BLUESKY_APP_PASSWORD", &self.app_password),
            ("SERVER_API_KEY", &self.api_key),
        ];

        for (name, value) in required {
            if value.is_empty() {
                return Err(ConnectorError::Validation(format!("{} is required", name)));
            }
        }

        if self.api_key.len() < 16 {
            warn!(
                "SERVER_API_KEY seems unusually short ({} characters)",
                self.api_key.len()
            );
        }

        info!("Configuration validated for account {}", self.handle);
        Ok(())
    }
}

/// Initializes env_logger with `level` as the default filter.
///
/// `RUST_LOG`, when set, takes precedence.
pub fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    if env_logger::Builder::from_env(env).try_init().is_err() {
        warn!("Logger already initialized");
    }
}

/// Gets the server port from the `SERVER_PORT` environment variable.
///
/// Falls back to 8080 when the variable is unset or not a valid port number.
///
/// # Example
///
/// ```rust
/// use bluesky_connector::get_server_port;
///
/// // With no SERVER_PORT set
/// let port = get_server_port(); // Returns 8080
/// ```
pub fn get_server_port() -> u16 {
    match env::var("SERVER_PORT") {
        Ok(value) => value.parse().unwrap_or_else(|_| {
            warn!(
                "SERVER_PORT '{}' is not a valid port, using {}",
                value, DEFAULT_PORT
            );
            DEFAULT_PORT
        }),
        Err(_) => DEFAULT_PORT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Mutex to prevent parallel test execution that manipulates SERVER_PORT
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn config() -> ConnectorConfig {
        ConnectorConfig {
            handle: "bot.bsky.social".to_string(),
            app_password: "abcd-efgh-ijkl-mnop".to_string(),
            api_key: "0123456789abcdef0123".to_string(),
            port: DEFAULT_PORT,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    #[test]
    fn test_get_server_port() {
        let _guard = ENV_LOCK.lock().unwrap();

        env::remove_var("SERVER_PORT");
        assert_eq!(get_server_port(), 8080);

        env::set_var("SERVER_PORT", "9090");
        assert_eq!(get_server_port(), 9090);

        env::set_var("SERVER_PORT", "not-a-port");
        assert_eq!(get_server_port(), 8080);

        env::remove_var("SERVER_PORT");
    }

    #[test]
    fn test_validate_reports_first_missing_variable() {
        assert!(config().validate().is_ok());

        let mut missing_handle = config();
        missing_handle.handle.clear();
        let err = missing_handle.validate().unwrap_err();
        assert_eq!(err.to_string(), "validation error: BLUESKY_HANDLE is required");

        let mut missing_password = config();
        missing_password.app_password.clear();
        assert!(missing_password
            .validate()
            .unwrap_err()
            .to_string()
            .contains("BLUESKY_APP_PASSWORD is required"));

        let mut missing_key = config();
        missing_key.api_key.clear();
        assert!(missing_key
            .validate()
            .unwrap_err()
            .to_string()
            .contains("SERVER_API_KEY is required"));
    }

    #[test]
    fn test_debug_masks_secrets() {
        let debug = format!("{:?}", config());
        assert!(!debug.contains("abcd-efgh-ijkl-mnop"));
        assert!(!debug.contains("0123456789abcdef0123"));
        assert!(debug.contains("abcd..."));
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret(""), "...");
        assert_eq!(mask_secret("abcd"), "...");
        assert_eq!(mask_secret("abcde"), "abcd...");
        assert_eq!(mask_secret("ééééé"), "éééé...");
    }
}
