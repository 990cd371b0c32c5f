//! Blob uploads and image embeds.

use log::{debug, info};

use super::api::WireClient;
use super::models::{BlobRef, BlobUploadResponse, Embed};
use crate::error::{ConnectorError, Result};

pub const UPLOAD_BLOB_ENDPOINT: &str = "/xrpc/com.atproto.repo.uploadBlob";

/// Fallback MIME type for payloads that are not a recognized image format.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Guesses an image MIME type from the payload's magic bytes.
///
/// # Example
///
/// ```rust
/// use bluesky_connector::detect_mime_type;
///
/// assert_eq!(detect_mime_type(&[0x89, 0x50, 0x4E, 0x47, 0x0D]), "image/png");
/// assert_eq!(detect_mime_type(b"hello"), "application/octet-stream");
/// ```
pub fn detect_mime_type(data: &[u8]) -> &'static str {
    if data.len() < 4 {
        return OCTET_STREAM;
    }

    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if data.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        "image/png"
    } else if data.starts_with(b"GIF") {
        "image/gif"
    } else if data.starts_with(b"RIFF") && data.get(8..12) == Some(b"WEBP".as_slice()) {
        "image/webp"
    } else {
        OCTET_STREAM
    }
}

/// Uploads binary assets to the account's repository.
#[derive(Clone)]
pub struct MediaUploader {
    wire: WireClient,
}

impl MediaUploader {
    pub fn new(wire: WireClient) -> Self {
        MediaUploader { wire }
    }

    /// Uploads `data` as a blob and returns the server's reference to it.
    pub async fn upload_blob(&self, data: &[u8], mime_type: &str) -> Result<BlobRef> {
        info!("Uploading blob ({} bytes, {})", data.len(), mime_type);

        let url = self.wire.endpoint(UPLOAD_BLOB_ENDPOINT);
        let body = self
            .wire
            .make_authenticated_request("upload_blob", |http, auth| {
                http.post(&url)
                    .header("Authorization", auth)
                    .header("Content-Type", mime_type)
                    .body(data.to_vec())
            })
            .await?;

        let uploaded: BlobUploadResponse =
            serde_json::from_str(&body).map_err(|e| ConnectorError::decode("upload_blob", e))?;
        debug!("Blob uploaded with CID {}", uploaded.blob.cid());
        Ok(uploaded.blob)
    }

    /// Uploads an image and wraps it in an images embed.
    pub async fn create_image_embed(&self, image: &[u8], alt_text: &str) -> Result<Embed> {
        let mime_type = detect_mime_type(image);
        let blob = self.upload_blob(image, mime_type).await?;
        Ok(Embed::image(blob, alt_text))
    }
}
