//! Post record creation.

use chrono::Utc;
use log::{debug, info};

use super::api::WireClient;
use super::models::{CreateRecordRequest, Embed, PostRecord, PostRef, ReplyRef, POST_RECORD_TYPE};
use super::richtext::detect_hashtags;
use crate::error::{ConnectorError, Result};

pub const CREATE_RECORD_ENDPOINT: &str = "/xrpc/com.atproto.repo.createRecord";

/// Creates `app.bsky.feed.post` records in the authenticated account's repository.
#[derive(Clone)]
pub struct RecordPublisher {
    wire: WireClient,
}

impl RecordPublisher {
    pub fn new(wire: WireClient) -> Self {
        RecordPublisher { wire }
    }

    /// Builds the record for `text`, with hashtag facets computed on that exact text.
    pub fn build_post(text: &str, reply: Option<ReplyRef>, embed: Option<Embed>) -> PostRecord {
        let facets = detect_hashtags(text);
        if !facets.is_empty() {
            debug!("Detected {} hashtag(s) in post", facets.len());
        }

        PostRecord {
            record_type: POST_RECORD_TYPE,
            text: text.to_string(),
            created_at: Utc::now(),
            reply,
            embed,
            facets,
        }
    }

    /// Creates one post and returns its reference.
    ///
    /// # Parameters
    ///
    /// - `text`: Final record text, thread marker included
    /// - `reply`: Root/parent references for every post after the first of a thread
    /// - `embed`: Optional image or link card
    pub async fn create_post(
        &self,
        text: &str,
        reply: Option<ReplyRef>,
        embed: Option<Embed>,
    ) -> Result<PostRef> {
        let repo = self.wire.session().account_id().await?;
        let record = Self::build_post(text, reply, embed);
        let request = CreateRecordRequest {
            repo: &repo,
            collection: POST_RECORD_TYPE,
            record: &record,
        };

        info!(
            "Creating post ({} bytes, reply: {}, embed: {})",
            record.text.len(),
            record.reply.is_some(),
            record.embed.is_some()
        );

        let url = self.wire.endpoint(CREATE_RECORD_ENDPOINT);
        let body = self
            .wire
            .make_authenticated_request("create_post", |http, auth| {
                http.post(&url)
                    .header("Authorization", auth)
                    .json(&request)
            })
            .await?;

        let post: PostRef =
            serde_json::from_str(&body).map_err(|e| ConnectorError::decode("create_post", e))?;
        info!("Post created: {}", post.uri);
        Ok(post)
    }
}
