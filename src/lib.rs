//! # Bluesky Connector Library
//!
//! A Rust web service library that publishes content to Bluesky through the AT Protocol.
//! Arbitrary-length text is split into a threaded sequence of posts, optionally with an
//! image on the first post and a trailing link card, using a single bot account whose
//! session tokens are refreshed transparently.
//!
//! ## Features
//!
//! - HTTP server with health and publish endpoints
//! - Balanced splitting of long text into thread parts
//! - Hashtag facets with exact UTF-8 byte offsets
//! - Automatic session refresh on expired tokens (one retry per call)
//! - Image uploads and link previews
//! - Structured logging
//!
//! ## Configuration
//!
//! - `BLUESKY_HANDLE`: Account handle (required)
//! - `BLUESKY_APP_PASSWORD`: App password (required)
//! - `SERVER_API_KEY`: Key expected in the `X-API-Key` header (required)
//! - `SERVER_PORT`: Server port (defaults to 8080)
//! - `LOG_LEVEL`: Log level (defaults to `info`)
//! - `BLUESKY_BASE_URL`: PDS host (defaults to `https://bsky.social`)
//!
//! ## API Endpoints
//!
//! - `GET /bluesky/api/health`: Returns service health status
//! - `POST /bluesky/api/posts/create`: Publishes a thread from a multipart form
//! - `POST /bluesky/api/test/posts/create`: Publishes a test post

pub mod atproto;
pub mod auth;
pub mod chunker;
pub mod config;
pub mod error;
pub mod handlers;
pub mod thread;

// Re-export commonly used types and functions
pub use atproto::{detect_hashtags, detect_mime_type, SessionManager};
pub use auth::build_bearer_auth_header;
pub use chunker::split_text_into_parts;
pub use config::{get_server_port, init_logging, mask_secret, ConnectorConfig};
pub use error::{ConnectorError, Result};
pub use handlers::{build_router, handle_health, AppState};
pub use thread::{PublishRequest, ThreadPoster};
