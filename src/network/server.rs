//! Relay server: socket setup, accept loop and shutdown
//!
//! Both sockets are bound up front so a bind failure stops startup instead
//! of leaving the server half listening.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::channels::ChannelRegistry;
use crate::config::ServerConfig;
use crate::error::{Error, NetworkError, Result};
use crate::mixer::Mixer;
use crate::network::discovery::DiscoveryResponder;
use crate::network::session::{Session, SessionSettings};
use crate::network::socket::{bind_tcp_listener, local_ip};
use crate::network::stats::ServerStats;
use crate::protocol::DiscoveryReply;

/// First pause after a failed accept; doubles per consecutive failure
const ACCEPT_BACKOFF_BASE: Duration = Duration::from_millis(5);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Triggers server shutdown from anywhere
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.tx.send_replace(true);
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    pub fn is_shutdown(&self) -> bool {
        *self.tx.borrow()
    }
}

/// A bound relay server, ready to run
pub struct RelayServer {
    listener: TcpListener,
    discovery: DiscoveryResponder,
    stream_addr: SocketAddr,
    discovery_addr: SocketAddr,
    registry: Arc<ChannelRegistry>,
    mixer: Arc<Mixer>,
    stats: Arc<ServerStats>,
    settings: SessionSettings,
    shutdown: ShutdownHandle,
}

impl RelayServer {
    /// Bind the stream listener and the discovery socket
    ///
    /// Must be called inside a tokio runtime.
    pub fn bind(config: &ServerConfig) -> Result<Self> {
        if config.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be > 0".into()));
        }

        let std_listener = bind_tcp_listener(config.stream_bind_addr()?, config.listen_backlog)?;
        let listener = TcpListener::from_std(std_listener).map_err(|e| NetworkError::BindFailed {
            addr: config.stream_bind_addr().map(|a| a.to_string()).unwrap_or_default(),
            reason: e.to_string(),
        })?;
        let stream_addr = listener.local_addr()?;

        let advertised = DiscoveryReply {
            host: advertise_host(config, stream_addr.ip()),
            port: stream_addr.port(),
        };
        let discovery = DiscoveryResponder::bind(config.discovery_bind_addr()?, advertised)?;
        let discovery_addr = discovery.local_addr()?;

        let registry = Arc::new(ChannelRegistry::new());
        let mixer = Arc::new(Mixer::new(registry.clone(), config.buffer_size));
        let (tx, _) = watch::channel(false);

        tracing::info!("Relay listening on {}, discovery on {}", stream_addr, discovery_addr);

        Ok(Self {
            listener,
            discovery,
            stream_addr,
            discovery_addr,
            registry,
            mixer,
            stats: Arc::new(ServerStats::new()),
            settings: SessionSettings::from(config),
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
        })
    }

    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_addr
    }

    pub fn discovery_addr(&self) -> SocketAddr {
        self.discovery_addr
    }

    /// What discovery replies announce
    pub fn advertised(&self) -> &DiscoveryReply {
        self.discovery.reply()
    }

    pub fn registry(&self) -> Arc<ChannelRegistry> {
        self.registry.clone()
    }

    pub fn stats(&self) -> Arc<ServerStats> {
        self.stats.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Serve until shutdown is requested
    ///
    /// On shutdown the listening sockets are closed, every session is told to
    /// stop and is awaited, then remaining registry state is released.
    pub async fn run(self) -> Result<()> {
        let RelayServer {
            listener,
            discovery,
            registry,
            mixer,
            stats,
            settings,
            shutdown,
            ..
        } = self;

        let discovery_task = tokio::spawn(discovery.run(shutdown.subscribe()));
        let mut sessions = JoinSet::new();
        let mut stop = shutdown.subscribe();
        let mut accept_errors: u32 = 0;

        loop {
            if *stop.borrow() {
                break;
            }

            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            accept_errors = 0;
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(%peer, "Failed to set TCP_NODELAY: {}", e);
                            }
                            let session = Session::new(
                                stream,
                                peer,
                                registry.clone(),
                                mixer.clone(),
                                stats.clone(),
                                settings,
                            );
                            tracing::debug!(session = %session.id(), %peer, "Accepted connection");
                            sessions.spawn(session.run(shutdown.subscribe()));
                        }
                        Err(e) => {
                            // Errors like EMFILE persist; don't spin on them
                            accept_errors = accept_errors.saturating_add(1);
                            let delay = accept_backoff(accept_errors);
                            tracing::warn!(
                                "Accept error ({} in a row), retrying in {:?}: {}",
                                accept_errors,
                                delay,
                                e
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(delay) => {}
                                _ = stop.changed() => {}
                            }
                        }
                    }
                }
                Some(finished) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!("Session task failed: {}", e);
                    }
                }
                _ = stop.changed() => {}
            }
        }

        drop(listener);
        tracing::info!("Shutting down, waiting for {} sessions", sessions.len());

        while let Some(finished) = sessions.join_next().await {
            if let Err(e) = finished {
                tracing::error!("Session task failed: {}", e);
            }
        }
        if let Err(e) = discovery_task.await {
            tracing::error!("Discovery task failed: {}", e);
        }

        let leftover = registry.clear();
        if leftover > 0 {
            tracing::warn!("Released {} members left after shutdown", leftover);
        }

        let totals = stats.snapshot();
        tracing::info!(
            "Server stopped: {} sessions, {} frames received, {} mixes sent, {} frames evicted",
            totals.sessions_opened,
            totals.frames_received,
            totals.mixes_sent,
            totals.frames_evicted
        );
        Ok(())
    }
}

/// Host announced to discovering clients
fn accept_backoff(consecutive_errors: u32) -> Duration {
    let shift = consecutive_errors.saturating_sub(1).min(16);
    ACCEPT_BACKOFF_BASE
        .saturating_mul(1u32 << shift)
        .min(ACCEPT_BACKOFF_MAX)
}

fn advertise_host(config: &ServerConfig, bound: IpAddr) -> String {
    if let Some(host) = &config.advertise_host {
        return host.clone();
    }
    if bound.is_unspecified() {
        local_ip().to_string()
    } else {
        bound.to_string()
    }
}
