//! Bluesky Thread Posting Script
//!
//! This script publishes a message to Bluesky from the command line, using the same
//! thread splitting, hashtag detection and link cards as the web service.
//!
//! Credentials are read from `BLUESKY_HANDLE` and `BLUESKY_APP_PASSWORD` (a `.env`
//! file is honored) and prompted for when missing.

use std::io::{self, Write};
use std::sync::Arc;

use bluesky_connector::{init_logging, ConnectorConfig, PublishRequest, SessionManager, ThreadPoster};

fn prompt(label: &str) -> io::Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut value = String::new();
    io::stdin().read_line(&mut value)?;
    Ok(value.trim().to_string())
}

fn value_or_prompt(value: &str, label: &str) -> io::Result<String> {
    if value.is_empty() {
        prompt(label)
    } else {
        Ok(value.to_string())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = ConnectorConfig::from_env();
    init_logging(&config.log_level);

    println!("🦋 Bluesky Thread Posting Tool");
    println!("==============================");

    let handle = value_or_prompt(&config.handle, "👤 Enter your Bluesky handle: ")?;
    let password = value_or_prompt(&config.app_password, "🔑 Enter your app password: ")?;
    if handle.is_empty() || password.is_empty() {
        println!("❌ Handle and app password cannot be empty!");
        return Err("Bluesky credentials are required".into());
    }

    let text = prompt("📝 Enter your message: ")?;
    if text.is_empty() {
        println!("❌ Message cannot be empty!");
        return Err("Message is required".into());
    }

    let url = prompt("🔗 Link to attach (leave empty for none): ")?;
    let request = PublishRequest {
        url: (!url.is_empty()).then_some(url),
        ..PublishRequest::new(text)
    };
    request.validate()?;

    println!("📏 Message length: {} bytes", request.text.len());

    let session = Arc::new(SessionManager::new(&config.base_url)?);
    let poster = ThreadPoster::new(session, &handle, &password)?;

    println!("\n🚀 Posting your thread...");
    match poster.publish(&request).await {
        Ok(posts) => {
            println!("\n🎉 Success! {} post(s) published.", posts.len());
            for post in posts {
                println!("📄 {} ({})", post.uri, post.cid);
            }
        }
        Err(e) => {
            println!("\n💥 Failed to post thread: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}
