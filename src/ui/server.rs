//! HTTP status server

use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;

use crate::channels::ChannelRegistry;
use crate::config::UiConfig;
use crate::error::{Error, NetworkError, Result};
use crate::network::ServerStats;
use crate::ui::handlers;

/// Shared state for handlers
pub struct AppState {
    pub registry: Arc<ChannelRegistry>,
    pub stats: Arc<ServerStats>,
    pub stream_addr: SocketAddr,
    pub started_at: Instant,
}

/// Build the API router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(handlers::get_status))
        .route("/api/channels", get(handlers::get_channels))
        .route("/api/channels/:key", get(handlers::get_channel))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Read-only status web server
pub struct WebServer {
    config: UiConfig,
    state: Arc<AppState>,
}

impl WebServer {
    pub fn new(config: UiConfig, state: AppState) -> Self {
        Self {
            config,
            state: Arc::new(state),
        }
    }

    /// Bind and serve in the background until `shutdown` flips to `true`
    pub async fn start_background(
        self,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(SocketAddr, JoinHandle<()>)> {
        let ip = self
            .config
            .bind_address
            .parse::<std::net::IpAddr>()
            .map_err(|_| Error::Config(format!("invalid ui.bind_address: {}", self.config.bind_address)))?;
        let addr = SocketAddr::new(ip, self.config.http_port);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| NetworkError::BindFailed {
                addr: addr.to_string(),
                reason: e.to_string(),
            })?;
        let local = listener.local_addr()?;
        let app = router(self.state);

        let handle = tokio::spawn(async move {
            let stopped = async move {
                let _ = shutdown.wait_for(|stop| *stop).await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(stopped).await {
                tracing::error!("Web server error: {}", e);
            }
        });

        tracing::info!("Status API available at http://{}/api/status", local);
        Ok((local, handle))
    }
}
