//! # Bluesky Connector
//!
//! A Rust web service that publishes text, images and links to Bluesky as threaded posts.
//!
//! ## Environment Variables
//!
//! - `BLUESKY_HANDLE`: Account handle (required)
//! - `BLUESKY_APP_PASSWORD`: App password (required)
//! - `SERVER_API_KEY`: API key for the publish endpoints (required)
//! - `SERVER_PORT`: Server port (defaults to 8080)
//! - `LOG_LEVEL`: Log level (defaults to `info`, `RUST_LOG` takes precedence)
//!
//! ## API Endpoints
//!
//! - `GET /bluesky/api/health`: Returns service health status
//! - `POST /bluesky/api/posts/create`: Publishes a thread (requires `X-API-Key`)
//! - `POST /bluesky/api/test/posts/create`: Publishes a test post (requires `X-API-Key`)

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{header, HeaderName, Method};
use bluesky_connector::{
    auth::API_KEY_HEADER, build_router, init_logging, AppState, ConnectorConfig, SessionManager,
    ThreadPoster,
};
use log::{error, info};
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Main entry point for the bluesky-connector web service.
///
/// Loads and validates the configuration, logs in to Bluesky once (fatal on failure),
/// then serves the HTTP API until Ctrl-C or SIGTERM.
///
/// # Example Usage
///
/// ```bash
/// BLUESKY_HANDLE=bot.bsky.social BLUESKY_APP_PASSWORD=xxxx-xxxx-xxxx-xxxx \
///   SERVER_API_KEY=secret cargo run
///
/// # Run with debug logging
/// LOG_LEVEL=debug cargo run
/// ```
#[tokio::main]
async fn main() {
    let config = ConnectorConfig::from_env();
    init_logging(&config.log_level);

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    let poster = match SessionManager::new(&config.base_url)
        .and_then(|session| ThreadPoster::new(Arc::new(session), &config.handle, &config.app_password))
    {
        Ok(poster) => poster,
        Err(e) => {
            error!("Failed to initialize Bluesky client: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = poster.authenticate().await {
        error!("Failed to authenticate with Bluesky: {}", e);
        std::process::exit(1);
    }

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::ORIGIN,
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
            HeaderName::from_static("x-api-key"),
        ]);

    let app = build_router(AppState::new(poster, &config.api_key)).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();
    info!(
        "Starting Bluesky Connector server on {} ({} header required for publishing)",
        addr, API_KEY_HEADER
    );

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("HTTP server error: {}", e);
    }

    info!("Server exited");
}

/// Waits for a registered signal. A listener that could not be registered never fires,
/// so the server keeps running instead of shutting down right away.
#[cfg_attr(not(unix), allow(dead_code))]
async fn wait_for_signal<F>(name: &str, listener: std::io::Result<F>)
where
    F: Future<Output = ()>,
{
    match listener {
        Ok(signal) => signal.await,
        Err(e) => {
            error!("Failed to listen for {}: {}", name, e);
            std::future::pending::<()>().await
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await
        }
    };

    #[cfg(unix)]
    let terminate = wait_for_signal(
        "SIGTERM",
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).map(
            |mut signal| async move {
                signal.recv().await;
            },
        ),
    );

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutting down server...");
}
