//! Publishing a message as a thread of posts.
//!
//! A publish is planned up front as an ordered list of [`ThreadStep`]s (one per text
//! part, plus an optional trailing link post) and then run strictly in order. Each step
//! receives the [`ThreadState`] built so far and returns the next one. A failing step
//! ends the publish; posts created by earlier steps are left in place, nothing is
//! rolled back.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, info};
use reqwest::Client;

use crate::atproto::api::{sanitize_for_logging, WireClient};
use crate::atproto::media::MediaUploader;
use crate::atproto::models::{Embed, PostRef, ReplyRef, Session};
use crate::atproto::opengraph::{create_external_embed, preview_client};
use crate::atproto::records::RecordPublisher;
use crate::atproto::session::SessionManager;
use crate::chunker::split_text_into_parts;
use crate::error::{ConnectorError, Result};

/// Longest text part, in bytes, before the thread marker is added.
pub const MAX_POST_LENGTH: usize = 295;
/// Pause before every post after the first, for the service's rate limits.
pub const DELAY_BETWEEN_POSTS: Duration = Duration::from_secs(2);
/// Appended to every published message.
pub const PROMO_SUFFIX: &str = "\n\n#GitHub #OpenSource";
pub const LINK_POST_TEXT: &str = "Link:";
pub const IMAGE_ALT_TEXT: &str = "Image";

/// Input of a publish call.
#[derive(Debug, Clone, Default)]
pub struct PublishRequest {
    pub text: String,
    pub url: Option<String>,
    pub image: Option<Vec<u8>>,
}

impl PublishRequest {
    pub fn new(text: impl Into<String>) -> Self {
        PublishRequest {
            text: text.into(),
            ..Default::default()
        }
    }

    /// Rejects requests that must not reach the network.
    pub fn validate(&self) -> Result<()> {
        if self.text.trim().is_empty() {
            return Err(ConnectorError::Validation(
                "Text field is required".to_string(),
            ));
        }

        if let Some(link) = &self.url {
            let parsed = url::Url::parse(link)
                .map_err(|e| ConnectorError::Validation(format!("Invalid url '{}': {}", link, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConnectorError::Validation(format!(
                    "Invalid url '{}': only http and https links are supported",
                    link
                )));
            }
        }

        if matches!(&self.image, Some(image) if image.is_empty()) {
            return Err(ConnectorError::Validation("Image is empty".to_string()));
        }

        Ok(())
    }
}

/// One record submission of a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThreadStep {
    /// Text part `index` (zero-based) of `total`, with its final text.
    Segment {
        index: usize,
        total: usize,
        text: String,
    },
    /// Trailing reply carrying a link card.
    Link { url: String },
}

impl ThreadStep {
    fn label(&self) -> String {
        match self {
            ThreadStep::Segment { index, total, .. } => format!("post {}/{}", index + 1, total),
            ThreadStep::Link { .. } => "link post".to_string(),
        }
    }
}

/// References accumulated while a thread is being posted.
#[derive(Debug, Clone, Default)]
pub struct ThreadState {
    root: Option<PostRef>,
    parent: Option<PostRef>,
    posts: Vec<PostRef>,
}

impl ThreadState {
    /// Reply references for the next post: the thread's first post and the latest one.
    pub fn reply_ref(&self) -> Option<ReplyRef> {
        match (&self.root, &self.parent) {
            (Some(root), Some(parent)) => Some(ReplyRef {
                root: root.clone(),
                parent: parent.clone(),
            }),
            _ => None,
        }
    }

    pub fn record(mut self, post: PostRef) -> Self {
        if self.root.is_none() {
            self.root = Some(post.clone());
        }
        self.parent = Some(post.clone());
        self.posts.push(post);
        self
    }

    pub fn posts(&self) -> &[PostRef] {
        &self.posts
    }

    pub fn into_posts(self) -> Vec<PostRef> {
        self.posts
    }
}

/// Prefixes a part with its zero-based thread position, e.g. `🧵 0/2 `.
pub fn with_thread_marker(part: &str, index: usize, total: usize) -> String {
    if total > 1 {
        format!("🧵 {}/{} {}", index, total - 1, part)
    } else {
        part.to_string()
    }
}

/// Plans the ordered steps that publish `text` (suffix included) and an optional link.
pub fn plan_thread(text: &str, url: Option<&str>) -> Vec<ThreadStep> {
    let full_text = format!("{}{}", text, PROMO_SUFFIX);
    let parts = split_text_into_parts(&full_text, MAX_POST_LENGTH);
    let total = parts.len();

    let mut steps: Vec<ThreadStep> = parts
        .iter()
        .enumerate()
        .map(|(index, part)| ThreadStep::Segment {
            index,
            total,
            text: with_thread_marker(part, index, total),
        })
        .collect();

    if let Some(url) = url {
        steps.push(ThreadStep::Link {
            url: url.to_string(),
        });
    }

    steps
}

/// Publishes messages as threads on behalf of the bot account.
pub struct ThreadPoster {
    session: Arc<SessionManager>,
    records: RecordPublisher,
    media: MediaUploader,
    preview: Client,
    identifier: String,
    password: String,
    post_delay: Duration,
}

impl ThreadPoster {
    pub fn new(session: Arc<SessionManager>, identifier: &str, password: &str) -> Result<Self> {
        let wire = WireClient::new(session.clone());
        Ok(ThreadPoster {
            session,
            records: RecordPublisher::new(wire.clone()),
            media: MediaUploader::new(wire),
            preview: preview_client()?,
            identifier: identifier.to_string(),
            password: password.to_string(),
            post_delay: DELAY_BETWEEN_POSTS,
        })
    }

    /// Overrides the pause between posts.
    pub fn with_post_delay(mut self, delay: Duration) -> Self {
        self.post_delay = delay;
        self
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Logs in with the configured account credentials.
    pub async fn authenticate(&self) -> Result<Session> {
        info!("Authenticating with Bluesky...");
        self.session.login(&self.identifier, &self.password).await
    }

    /// Publishes `request` and returns the created posts in submission order.
    ///
    /// On error, posts created before the failing step remain published.
    pub async fn publish(&self, request: &PublishRequest) -> Result<Vec<PostRef>> {
        request.validate()?;

        if !self.session.is_authenticated().await {
            self.authenticate().await?;
        }

        let steps = plan_thread(&request.text, request.url.as_deref());
        info!("Posting content in {} steps", steps.len());

        let mut state = ThreadState::default();
        for (i, step) in steps.iter().enumerate() {
            if i > 0 {
                debug!("Waiting {:?} before next post", self.post_delay);
                tokio::time::sleep(self.post_delay).await;
            }

            state = self
                .run_step(step, state, request.image.as_deref())
                .await
                .map_err(|e| e.in_step(step.label()))?;
        }

        info!("Successfully posted {} posts", state.posts().len());
        Ok(state.into_posts())
    }

    async fn run_step(
        &self,
        step: &ThreadStep,
        state: ThreadState,
        image: Option<&[u8]>,
    ) -> Result<ThreadState> {
        let reply = state.reply_ref();

        let post = match step {
            ThreadStep::Segment { index, total, text } => {
                let embed = match image {
                    Some(image) if *index == 0 => {
                        info!("Uploading image for first post");
                        Some(
                            self.media
                                .create_image_embed(image, IMAGE_ALT_TEXT)
                                .await
                                .map_err(|e| e.in_step("image upload"))?,
                        )
                    }
                    _ => None,
                };

                info!(
                    "Creating post {}/{}: {}",
                    index + 1,
                    total,
                    sanitize_for_logging(text, 50)
                );
                self.records.create_post(text, reply, embed).await?
            }
            ThreadStep::Link { url } => {
                info!("Adding URL as final reply: {}", url);
                let embed: Embed = create_external_embed(&self.preview, &self.media, url).await;
                self.records
                    .create_post(LINK_POST_TEXT, reply, Some(embed))
                    .await?
            }
        };

        Ok(state.record(post))
    }
}
