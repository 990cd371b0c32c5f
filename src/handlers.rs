//! HTTP route handlers for the bluesky-connector service.
//!
//! This module contains the shared application state, the route handler functions
//! and the router that ties them together.

use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use log::{error, info};
use serde_json::{json, Value};

use crate::atproto::api::sanitize_for_logging;
use crate::atproto::models::CreatePostResponse;
use crate::auth::{require_api_key, ApiKey};
use crate::error::ConnectorError;
use crate::thread::{PublishRequest, ThreadPoster};

/// Largest accepted request body (form fields plus image).
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

pub const TEST_POST_TEXT: &str = "Test post from Bluesky Connector";

/// State shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub poster: Arc<ThreadPoster>,
    pub api_key: ApiKey,
}

impl AppState {
    pub fn new(poster: ThreadPoster, api_key: &str) -> Self {
        AppState {
            poster: Arc::new(poster),
            api_key: ApiKey::new(api_key),
        }
    }
}

type HandlerError = (StatusCode, Json<CreatePostResponse>);

fn error_response(status: StatusCode, message: String) -> HandlerError {
    (
        status,
        Json(CreatePostResponse {
            posts: Vec::new(),
            error: Some(message),
        }),
    )
}

fn publish_error(err: ConnectorError) -> HandlerError {
    let status = if err.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, err.to_string())
}

/// Builds the application router.
///
/// # Routes
///
/// - `GET /bluesky/api/health`: Health check, no authentication
/// - `POST /bluesky/api/posts/create`: Publishes a multipart form (`text`, `url`, `image`)
/// - `POST /bluesky/api/test/posts/create`: Publishes a fixed test message
///
/// The two publish routes require the `X-API-Key` header.
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/posts/create", post(handle_create_post))
        .route("/test/posts/create", post(handle_test_post))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    let api = Router::new()
        .route("/health", get(handle_health))
        .merge(protected);

    Router::new()
        .nest("/bluesky/api", api)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

/// Handles GET requests to the `/health` endpoint.
///
/// # Example Response
///
/// ```json
/// {
///   "status": "healthy",
///   "service": "bluesky-connector",
///   "timestamp": "2024-01-01T00:00:00+00:00"
/// }
/// ```
pub async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "bluesky-connector",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn read_publish_form(mut multipart: Multipart) -> Result<PublishRequest, HandlerError> {
    let bad_request = |e: axum::extract::multipart::MultipartError| {
        error!("Failed to read form data: {}", e);
        error_response(
            StatusCode::BAD_REQUEST,
            format!("Failed to read form data: {}", e),
        )
    };

    let mut request = PublishRequest::default();
    while let Some(field) = multipart.next_field().await.map_err(bad_request)? {
        match field.name() {
            Some("text") => request.text = field.text().await.map_err(bad_request)?,
            Some("url") => {
                let url = field.text().await.map_err(bad_request)?;
                let url = url.trim();
                if !url.is_empty() {
                    request.url = Some(url.to_string());
                }
            }
            Some("image") => {
                let file_name = field.file_name().unwrap_or("image").to_string();
                let data = field.bytes().await.map_err(bad_request)?;
                if !data.is_empty() {
                    info!("Image included in request: {} ({} bytes)", file_name, data.len());
                    request.image = Some(data.to_vec());
                }
            }
            _ => {}
        }
    }

    Ok(request)
}

/// Handles POST requests to the `/posts/create` endpoint.
///
/// Expects a multipart form with a required `text` field, an optional `url` field and
/// an optional `image` file.
///
/// # Success Response
///
/// ```json
/// { "posts": [ { "uri": "at://...", "cid": "..." } ] }
/// ```
///
/// # Error Response
///
/// ```json
/// { "posts": [], "error": "<error details>" }
/// ```
pub async fn handle_create_post(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CreatePostResponse>, HandlerError> {
    info!("Received post request at {}", chrono::Utc::now().to_rfc3339());

    let request = read_publish_form(multipart).await?;
    if request.text.is_empty() {
        error!("Missing required field: text");
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Text field is required".to_string(),
        ));
    }

    info!("Text content: {}", sanitize_for_logging(&request.text, 50));
    if let Some(url) = &request.url {
        info!("URL included: {}", url);
    }
    if request.image.is_none() {
        info!("No image in request");
    }

    match state.poster.publish(&request).await {
        Ok(posts) => {
            info!("Request completed successfully with {} posts", posts.len());
            Ok(Json(CreatePostResponse { posts, error: None }))
        }
        Err(e) => {
            error!("Failed to create post: {}", e);
            Err(publish_error(e))
        }
    }
}

/// Handles POST requests to the `/test/posts/create` endpoint.
///
/// Publishes the fixed text "Test post from Bluesky Connector".
pub async fn handle_test_post(
    State(state): State<AppState>,
) -> Result<Json<CreatePostResponse>, HandlerError> {
    info!("Received test post request");

    match state.poster.publish(&PublishRequest::new(TEST_POST_TEXT)).await {
        Ok(posts) => {
            info!(
                "Test request completed successfully with {} posts",
                posts.len()
            );
            Ok(Json(CreatePostResponse { posts, error: None }))
        }
        Err(e) => {
            error!("Failed to create test post: {}", e);
            Err(publish_error(e))
        }
    }
}
