use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use nereid::{ApiClient, ChatWidget, Event, EventBus, MessageDraft};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    if let Err(e) = dotenvy::dotenv() {
        // It's not fatal if .env doesn't exist, but good to know
        info!("No .env file found or failed to load: {}", e);
    }

    // Initialize logging with default filter if RUST_LOG is not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let base_url = std::env::var("NEREID_API_URL")
        .map_err(|_| anyhow::anyhow!("NEREID_API_URL not set"))?;
    let token = std::env::var("NEREID_API_TOKEN")
        .map_err(|_| anyhow::anyhow!("NEREID_API_TOKEN not set"))?;

    info!("Nereid chat client starting...");

    let bus = Arc::new(EventBus::new());
    let api = Arc::new(ApiClient::new(base_url, token)?);

    let widget = Arc::new(ChatWidget::open(api, bus.clone(), None).await?);
    info!("Session {} acquired, type a message to send it", widget.session_id());
    widget.start_refresh();

    // Mirror bus events into the log so the session is observable
    let mut bus_rx = bus.subscribe();
    let events = tokio::spawn(async move {
        while let Ok(event) = bus_rx.recv().await {
            match event {
                Event::SessionUpdated { session_id } => info!("session {} updated", session_id),
                Event::SessionClosed { session_id } => {
                    info!("session {} closed", session_id);
                    break;
                }
                Event::Error { scope, message } => error!("[{:?}] {}", scope, message),
                _ => {}
            }
        }
    });

    // Read stdin lines as messages; /close ends the session
    let input_widget = widget.clone();
    let input = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line == "/close" {
                if let Err(e) = input_widget.close().await {
                    error!("Failed to close session: {}", e);
                }
                break;
            }
            let draft = MessageDraft::text(line);
            if let Err(e) = input_widget.send(&draft).await {
                error!("Failed to send message: {}", e);
            }
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = events => {
            info!("Session ended");
        }
        _ = input => {
            info!("Input stream closed");
        }
    }

    widget.stop_refresh();
    Ok(())
}
