//! Tombala Session Server - Entry Point
//!
//! Starts the TCP listener and the presenter console, accepting
//! WebSocket connections on `/ws/game/{gameId}`.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use tombala_server::{console, handle_connection, Config, TombalaServer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=tombala_server=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tombala_server=info")),
        )
        .init();

    let config = Config::from_env()?;

    // Start TCP listener
    let listener = TcpListener::bind(&config.bind_addr).await?;
    info!("Tombala server listening on {}", config.bind_addr);

    let server = Arc::new(TombalaServer::new(config));
    tokio::spawn(console::run(Arc::clone(&server)));

    // Connection accept loop
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("New connection from {}", addr);
                let server = Arc::clone(&server);

                // Spawn handler task for each connection
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, server).await {
                        error!("Connection handler error: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
