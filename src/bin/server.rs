//! Voice Relay Server
//!
//! Accepts client connections, mixes each channel and answers discovery.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lan_voice_relay::{
    config::{AppConfig, CONFIG_ENV_VAR},
    network::RelayServer,
    status::StatusReporter,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting LAN Voice Relay");

    // Config path: first argument, then environment, then default location
    let config_path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var(CONFIG_ENV_VAR).ok())
        .map(PathBuf::from);
    let config = AppConfig::load_or_default(config_path.as_deref())
        .context("Failed to load configuration")?;

    tracing::info!(
        "Frame size {} samples, handshake region {} bytes",
        config.server.buffer_size,
        config.server.handshake_size
    );

    let server = RelayServer::bind(&config.server).context("Failed to bind relay sockets")?;
    let shutdown = server.shutdown_handle();

    tracing::info!(
        "Advertising {}:{} via discovery on {}",
        server.advertised().host,
        server.advertised().port,
        server.discovery_addr()
    );

    if config.status.enabled {
        let reporter = StatusReporter::new(
            server.registry(),
            server.stream_addr(),
            config.status.interval(),
        );
        tokio::spawn(reporter.run(shutdown.subscribe()));
    }

    if config.ui.enabled {
        start_status_api(&config, &server, shutdown.subscribe()).await?;
    }

    let ctrl_c_shutdown = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown requested");
                ctrl_c_shutdown.shutdown();
            }
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    });

    tracing::info!("Relay running - press Ctrl+C to stop");
    server.run().await?;

    Ok(())
}

#[cfg(feature = "http-ui")]
async fn start_status_api(
    config: &AppConfig,
    server: &RelayServer,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    use lan_voice_relay::ui::{AppState, WebServer};

    let web_server = WebServer::new(
        config.ui.clone(),
        AppState {
            registry: server.registry(),
            stats: server.stats(),
            stream_addr: server.stream_addr(),
            started_at: std::time::Instant::now(),
        },
    );
    web_server
        .start_background(shutdown)
        .await
        .context("Failed to start status API")?;
    Ok(())
}

#[cfg(not(feature = "http-ui"))]
async fn start_status_api(
    _config: &AppConfig,
    _server: &RelayServer,
    _shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    tracing::warn!("Status API requested but built without the http-ui feature");
    Ok(())
}
