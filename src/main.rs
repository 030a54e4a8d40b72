use anyhow::Result;
use fleetsync::config::{load_config, SyncConfig};
use fleetsync::surface::LoggingSurface;
use fleetsync::sync::{SyncInput, Synchronizer};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleetsync=info".into()),
        )
        .init();

    info!("Fleetsync starting...");

    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("FLEETSYNC_CONFIG").ok());
    let config = match config_path {
        Some(path) => {
            info!(path = %path, "Loading configuration");
            load_config(&path)?
        }
        None => {
            info!("No config file given, using defaults");
            SyncConfig::default()
        }
    };

    let mut sync = Synchronizer::new(config, Box::new(LoggingSurface::new()))?;
    sync.on(
        "orderStatusUpdate",
        Arc::new(|data: &Value| {
            info!(
                order_id = ?data.get("orderId").and_then(serde_json::Value::as_str),
                status = ?data.get("status").and_then(serde_json::Value::as_str),
                "Order status changed"
            );
        }),
    );

    let (input_tx, input_rx) = mpsc::channel(64);
    // A headless surface has nothing to load
    input_tx.send(SyncInput::SurfaceReady).await?;

    let shutdown_tx = input_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            return;
        }
        info!("Shutdown requested");
        let _ = shutdown_tx.send(SyncInput::Shutdown).await;
    });

    sync.run(input_rx).await?;

    // Keep the input side open until the loop exits
    drop(input_tx);
    info!("Fleetsync stopped");
    Ok(())
}
