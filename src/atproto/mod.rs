//! AT Protocol integration module.
//!
//! This module contains the session handling, authenticated XRPC calls, record and
//! blob operations, rich-text facet detection and link preview enrichment used to
//! publish posts on Bluesky.

pub mod api;
pub mod media;
pub mod models;
pub mod opengraph;
pub mod records;
pub mod richtext;
pub mod session;

// Re-export public API
pub use api::WireClient;
pub use media::{detect_mime_type, MediaUploader};
pub use models::{BlobRef, Embed, Facet, PostRecord, PostRef, ReplyRef, Session};
pub use records::RecordPublisher;
pub use richtext::detect_hashtags;
pub use session::SessionManager;
