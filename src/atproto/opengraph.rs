//! Link preview enrichment for external embeds.
//!
//! Everything in here is best effort: [`create_external_embed`] always returns an
//! embed, falling back to a plain link card when the page or its image cannot be used.

use std::time::Duration;

use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Response};

use super::media::{detect_mime_type, MediaUploader};
use super::models::{Embed, ExternalLink};
use crate::error::{ConnectorError, Result};

const USER_AGENT: &str = "Mozilla/5.0 (compatible; BlueskyBot/1.0)";
const PAGE_TIMEOUT: Duration = Duration::from_secs(10);
const IMAGE_TIMEOUT: Duration = Duration::from_secs(15);
const MAX_PAGE_BYTES: usize = 64 * 1024;
const MAX_IMAGE_BYTES: usize = 1024 * 1024;

static META_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<meta\b[^>]*>").expect("meta tag pattern is valid"));
static META_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([A-Za-z:-]+)\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("meta attribute pattern is valid")
});
static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<title[^>]*>([^<]*)</title>").expect("title pattern is valid"));

/// Preview metadata extracted from a page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenGraphData {
    pub title: String,
    pub description: String,
    pub image: Option<String>,
}

/// Builds the HTTP client used for page and image fetches.
pub fn preview_client() -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(PAGE_TIMEOUT)
        .build()
        .map_err(|e| ConnectorError::transport("build_preview_client", e))
}

async fn read_limited(mut response: Response, limit: usize) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| ConnectorError::Enrichment(format!("failed to read response: {}", e)))?
    {
        let room = limit - data.len();
        if chunk.len() >= room {
            data.extend_from_slice(&chunk[..room]);
            break;
        }
        data.extend_from_slice(&chunk);
    }
    Ok(data)
}

async fn get(client: &Client, url: &str, timeout: Duration) -> Result<Response> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| ConnectorError::Enrichment(format!("failed to fetch {}: {}", url, e)))?;

    if response.status() != reqwest::StatusCode::OK {
        return Err(ConnectorError::Enrichment(format!(
            "HTTP error {} for {}",
            response.status(),
            url
        )));
    }
    Ok(response)
}

/// Fetches `url` and extracts its Open Graph metadata from the first 64 KiB.
pub async fn fetch_open_graph(client: &Client, url: &str) -> Result<OpenGraphData> {
    let response = get(client, url, PAGE_TIMEOUT).await?;
    let body = read_limited(response, MAX_PAGE_BYTES).await?;
    let html = String::from_utf8_lossy(&body);

    let data = parse_open_graph(&html, url);
    debug!(
        "Fetched OG data - title: {}, description: {} bytes, image: {:?}",
        data.title,
        data.description.len(),
        data.image
    );
    Ok(data)
}

/// Extracts preview metadata from an HTML document.
///
/// The title falls back to `<title>` and then to `url`; the description falls back to
/// the plain `description` meta tag. A relative `og:image` is resolved against `url`.
pub fn parse_open_graph(html: &str, url: &str) -> OpenGraphData {
    let title = extract_meta_content(html, "og:title")
        .or_else(|| extract_title_tag(html))
        .unwrap_or_else(|| url.to_string());
    let description = extract_meta_content(html, "og:description")
        .or_else(|| extract_meta_content(html, "description"))
        .unwrap_or_default();
    let image = extract_meta_content(html, "og:image")
        .and_then(|image| resolve_image_url(url, &image));

    OpenGraphData {
        title,
        description,
        image,
    }
}

/// Reads the `content` of the first `<meta>` tag whose `property` is `key`, falling back
/// to the first one whose `name` is `key`. Attribute order and case do not matter.
fn extract_meta_content(html: &str, key: &str) -> Option<String> {
    let tags: Vec<Vec<(String, String)>> = META_TAG_RE
        .find_iter(html)
        .map(|tag| meta_attributes(tag.as_str()))
        .collect();

    ["property", "name"].iter().find_map(|attribute| {
        tags.iter().find_map(|attrs| {
            let matches_key = attrs
                .iter()
                .any(|(name, value)| name == attribute && value.eq_ignore_ascii_case(key));
            if !matches_key {
                return None;
            }
            attrs
                .iter()
                .find(|(name, _)| name == "content")
                .map(|(_, content)| content.trim().to_string())
                .filter(|content| !content.is_empty())
        })
    })
}

fn meta_attributes(tag: &str) -> Vec<(String, String)> {
    META_ATTR_RE
        .captures_iter(tag)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3))?.as_str().to_string();
            Some((name, value))
        })
        .collect()
}

/// Resolves a possibly relative image reference against the page it came from.
fn resolve_image_url(page_url: &str, image: &str) -> Option<String> {
    match url::Url::parse(page_url).and_then(|base| base.join(image)) {
        Ok(resolved) => Some(resolved.to_string()),
        Err(e) => {
            debug!("Ignoring og:image '{}': {}", image, e);
            None
        }
    }
}

fn extract_title_tag(html: &str) -> Option<String> {
    TITLE_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|title| !title.is_empty())
}

/// Downloads an image of at most 1 MiB and returns it with its MIME type.
pub async fn fetch_image(client: &Client, url: &str) -> Result<(Vec<u8>, String)> {
    let response = get(client, url, IMAGE_TIMEOUT).await?;
    let header_mime = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let data = read_limited(response, MAX_IMAGE_BYTES).await?;
    let mime_type = header_mime.unwrap_or_else(|| detect_mime_type(&data).to_string());
    Ok((data, mime_type))
}

/// Builds a link card for `url`, enriched with page metadata when available.
///
/// Never fails: a page that cannot be fetched yields a plain card titled with the
/// URL, and an unusable preview image only drops the thumbnail.
pub async fn create_external_embed(client: &Client, media: &MediaUploader, url: &str) -> Embed {
    let og = match fetch_open_graph(client, url).await {
        Ok(og) => og,
        Err(e) => {
            warn!("{}, using plain link card", e);
            return Embed::plain_link(url);
        }
    };

    let mut external = ExternalLink {
        uri: url.to_string(),
        title: og.title,
        description: og.description,
        thumb: None,
    };

    if let Some(image_url) = og.image {
        match fetch_image(client, &image_url).await {
            Ok((data, mime_type)) => match media.upload_blob(&data, &mime_type).await {
                Ok(blob) => {
                    info!("Uploaded thumbnail for link card");
                    external.thumb = Some(blob);
                }
                Err(e) => warn!("Failed to upload thumbnail: {}, continuing without it", e),
            },
            Err(e) => warn!("{}, continuing without thumbnail", e),
        }
    }

    Embed::External { external }
}
