//! AT Protocol wire types used by the connector.
//!
//! Field names follow the lexicon JSON (`camelCase`, `$type` discriminators).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

pub const POST_RECORD_TYPE: &str = "app.bsky.feed.post";
pub const TAG_FEATURE_TYPE: &str = "app.bsky.richtext.facet#tag";

/// Body of `com.atproto.server.createSession`.
#[derive(Debug, Serialize)]
pub struct CreateSessionRequest<'a> {
    pub identifier: &'a str,
    pub password: &'a str,
}

/// The authenticated identity and its token pair.
///
/// Returned by both `createSession` and `refreshSession`.
#[derive(Clone, Deserialize)]
pub struct Session {
    #[serde(rename = "accessJwt")]
    pub access_token: String,
    #[serde(rename = "refreshJwt")]
    pub refresh_token: String,
    #[serde(rename = "did")]
    pub account_id: String,
    #[serde(rename = "handle")]
    pub account_handle: String,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("account_id", &self.account_id)
            .field("account_handle", &self.account_handle)
            .finish()
    }
}

/// Error body returned by XRPC endpoints.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RemoteError {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl RemoteError {
    pub fn is_expired_token(&self) -> bool {
        self.error == "ExpiredToken"
    }
}

impl std::fmt::Display for RemoteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Strong reference to a record: its AT URI and content hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PostRef {
    pub uri: String,
    pub cid: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplyRef {
    pub root: PostRef,
    pub parent: PostRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ByteSlice {
    pub byte_start: usize,
    pub byte_end: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "$type")]
pub enum FacetFeature {
    #[serde(rename = "app.bsky.richtext.facet#tag")]
    Tag { tag: String },
}

/// A byte-range annotation over a record's text.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Facet {
    pub index: ByteSlice,
    pub features: Vec<FacetFeature>,
}

impl Facet {
    pub fn tag(byte_start: usize, byte_end: usize, tag: impl Into<String>) -> Self {
        Facet {
            index: ByteSlice {
                byte_start,
                byte_end,
            },
            features: vec![FacetFeature::Tag { tag: tag.into() }],
        }
    }

    pub fn byte_start(&self) -> usize {
        self.index.byte_start
    }

    pub fn byte_end(&self) -> usize {
        self.index.byte_end
    }

    /// The hashtag value (without `#`), if this facet carries one.
    pub fn tag_value(&self) -> Option<&str> {
        self.features.first().map(|feature| match feature {
            FacetFeature::Tag { tag } => tag.as_str(),
        })
    }
}

/// Content identifier of an uploaded blob.
///
/// Servers return the `ref` field either as a bare CID string or as an object wrapping
/// it (`{"$link": "..."}`). Both are normalized here when decoding; encoding always
/// produces the `$link` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLink(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawBlobLink {
    Bare(String),
    Object(Map<String, Value>),
}

impl BlobLink {
    pub fn new(cid: impl Into<String>) -> Self {
        BlobLink(cid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<RawBlobLink> for BlobLink {
    type Error = String;

    fn try_from(raw: RawBlobLink) -> Result<Self, Self::Error> {
        match raw {
            RawBlobLink::Bare(cid) => Ok(BlobLink(cid)),
            RawBlobLink::Object(map) => {
                if let Some(cid) = map.get("$link").and_then(Value::as_str) {
                    return Ok(BlobLink(cid.to_string()));
                }
                map.values()
                    .find_map(Value::as_str)
                    .map(|cid| BlobLink(cid.to_string()))
                    .ok_or_else(|| "blob ref object holds no CID string".to_string())
            }
        }
    }
}

impl<'de> Deserialize<'de> for BlobLink {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = RawBlobLink::deserialize(deserializer)?;
        BlobLink::try_from(raw).map_err(serde::de::Error::custom)
    }
}

impl Serialize for BlobLink {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = Map::new();
        map.insert("$link".to_string(), Value::String(self.0.clone()));
        map.serialize(serializer)
    }
}

/// Reference to an uploaded blob, as returned by `uploadBlob`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlobRef {
    #[serde(rename = "$type", default = "blob_type")]
    pub blob_type: String,
    #[serde(rename = "ref")]
    pub link: BlobLink,
    pub mime_type: String,
    #[serde(default)]
    pub size: u64,
}

fn blob_type() -> String {
    "blob".to_string()
}

impl BlobRef {
    /// The canonical CID string, whatever shape the server used for `ref`.
    pub fn cid(&self) -> &str {
        self.link.as_str()
    }
}

#[derive(Debug, Deserialize)]
pub struct BlobUploadResponse {
    pub blob: BlobRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EmbedImage {
    pub alt: String,
    pub image: BlobRef,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExternalLink {
    pub uri: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumb: Option<BlobRef>,
}

/// Media or link card attached to a post. A record carries at most one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "$type")]
pub enum Embed {
    #[serde(rename = "app.bsky.embed.images")]
    Images { images: Vec<EmbedImage> },
    #[serde(rename = "app.bsky.embed.external")]
    External { external: ExternalLink },
}

impl Embed {
    pub fn image(image: BlobRef, alt: impl Into<String>) -> Self {
        Embed::Images {
            images: vec![EmbedImage {
                alt: alt.into(),
                image,
            }],
        }
    }

    /// A plain link card without preview metadata.
    pub fn plain_link(uri: &str) -> Self {
        Embed::External {
            external: ExternalLink {
                uri: uri.to_string(),
                title: uri.to_string(),
                description: String::new(),
                thumb: None,
            },
        }
    }
}

/// An `app.bsky.feed.post` record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    #[serde(rename = "$type")]
    pub record_type: &'static str,
    pub text: String,
    #[serde(serialize_with = "serialize_rfc3339")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply: Option<ReplyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embed: Option<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub facets: Vec<Facet>,
}

fn serialize_rfc3339<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}

#[derive(Debug, Serialize)]
pub struct CreateRecordRequest<'a> {
    pub repo: &'a str,
    pub collection: &'static str,
    pub record: &'a PostRecord,
}

/// Response envelope of the publish endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreatePostResponse {
    pub posts: Vec<PostRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const CID: &str = "bafkreibjfgx2gprinfvicegelk5kosd6y2frmqpqzwqkg7usac74l3t2v4";

    #[test]
    fn test_blob_ref_accepts_bare_string_ref() {
        let blob: BlobRef = serde_json::from_value(json!({
            "$type": "blob",
            "ref": CID,
            "mimeType": "image/png",
            "size": 12345
        }))
        .unwrap();
        assert_eq!(blob.cid(), CID);
    }

    #[test]
    fn test_blob_ref_accepts_link_object() {
        let blob: BlobRef = serde_json::from_value(json!({
            "$type": "blob",
            "ref": {"$link": CID},
            "mimeType": "image/png",
            "size": 12345
        }))
        .unwrap();
        assert_eq!(blob.cid(), CID);
    }

    #[test]
    fn test_blob_ref_accepts_other_object_shapes() {
        let blob: BlobRef = serde_json::from_value(json!({
            "$type": "blob",
            "ref": {"cid": CID},
            "mimeType": "image/png",
            "size": 12345
        }))
        .unwrap();
        assert_eq!(blob.cid(), CID);

        let err = serde_json::from_value::<BlobRef>(json!({
            "ref": {"size": 1},
            "mimeType": "image/png"
        }));
        assert!(err.is_err());
    }

    #[test]
    fn test_blob_ref_always_encodes_link_object() {
        let blob: BlobRef = serde_json::from_value(json!({
            "ref": CID,
            "mimeType": "image/jpeg"
        }))
        .unwrap();
        let encoded = serde_json::to_value(&blob).unwrap();
        assert_eq!(encoded["ref"], json!({"$link": CID}));
        assert_eq!(encoded["$type"], "blob");
        assert_eq!(encoded["mimeType"], "image/jpeg");
    }

    #[test]
    fn test_post_record_wire_shape() {
        let parent = PostRef {
            uri: "at://did:plc:abc/app.bsky.feed.post/1".to_string(),
            cid: "cid1".to_string(),
        };
        let record = PostRecord {
            record_type: POST_RECORD_TYPE,
            text: "Hello #GitHub".to_string(),
            created_at: Utc::now(),
            reply: Some(ReplyRef {
                root: parent.clone(),
                parent,
            }),
            embed: Some(Embed::plain_link("https://example.com")),
            facets: vec![Facet::tag(6, 13, "GitHub")],
        };

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["$type"], "app.bsky.feed.post");
        assert_eq!(value["reply"]["root"]["cid"], "cid1");
        assert_eq!(value["embed"]["$type"], "app.bsky.embed.external");
        assert_eq!(value["embed"]["external"]["title"], "https://example.com");
        assert!(value["embed"]["external"].get("thumb").is_none());
        assert_eq!(value["facets"][0]["index"]["byteStart"], 6);
        assert_eq!(value["facets"][0]["features"][0]["$type"], TAG_FEATURE_TYPE);
        assert!(value["createdAt"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn test_post_record_omits_empty_optionals() {
        let record = PostRecord {
            record_type: POST_RECORD_TYPE,
            text: "plain".to_string(),
            created_at: Utc::now(),
            reply: None,
            embed: None,
            facets: Vec::new(),
        };
        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("reply").is_none());
        assert!(value.get("embed").is_none());
        assert!(value.get("facets").is_none());
    }

    #[test]
    fn test_session_debug_redacts_tokens() {
        let session: Session = serde_json::from_value(json!({
            "accessJwt": "secret-access",
            "refreshJwt": "secret-refresh",
            "did": "did:plc:abc",
            "handle": "bot.bsky.social"
        }))
        .unwrap();
        let debug = format!("{:?}", session);
        assert!(!debug.contains("secret-access"));
        assert!(!debug.contains("secret-refresh"));
        assert!(debug.contains("bot.bsky.social"));
    }
}
