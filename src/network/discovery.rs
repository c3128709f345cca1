//! UDP discovery
//!
//! The responder answers every datagram, whatever its payload, with the
//! stream endpoint. It keeps no state and never retries; a failed send is
//! logged and the next request is served.

use bytes::Bytes;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::watch;

use crate::constants::MAX_DISCOVERY_DATAGRAM;
use crate::error::NetworkError;
use crate::network::socket::bind_udp;
use crate::protocol::DiscoveryReply;

/// Stateless responder advertising the stream endpoint
pub struct DiscoveryResponder {
    socket: UdpSocket,
    reply: DiscoveryReply,
    payload: Bytes,
}

impl DiscoveryResponder {
    /// Bind the discovery socket; failure here is fatal for the server
    pub fn bind(addr: SocketAddr, reply: DiscoveryReply) -> Result<Self, NetworkError> {
        let std_socket = bind_udp(addr, true)?;
        let socket = UdpSocket::from_std(std_socket).map_err(|e| NetworkError::BindFailed {
            addr: addr.to_string(),
            reason: e.to_string(),
        })?;

        let payload = Bytes::from(reply.encode());
        Ok(Self {
            socket,
            reply,
            payload,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NetworkError> {
        self.socket
            .local_addr()
            .map_err(|e| NetworkError::BindFailed {
                addr: "discovery".into(),
                reason: e.to_string(),
            })
    }

    pub fn reply(&self) -> &DiscoveryReply {
        &self.reply
    }

    /// Serve requests until `shutdown` flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut buf = [0u8; MAX_DISCOVERY_DATAGRAM];
        tracing::info!(
            "Discovery responder advertising {}:{}",
            self.reply.host,
            self.reply.port
        );

        loop {
            tokio::select! {
                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((_, peer)) => {
                            tracing::debug!(%peer, "Discovery request");
                            if let Err(e) = self.socket.send_to(&self.payload, peer).await {
                                tracing::warn!(%peer, "Discovery reply failed: {}", e);
                            }
                        }
                        Err(e) => {
                            tracing::warn!("Discovery receive error: {}", e);
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Discovery responder stopped");
    }
}

/// Ask for the stream endpoint by sending a datagram to `target`
///
/// `target` is usually a broadcast address. Each attempt waits up to
/// `timeout` for a reply; replies that do not decode are skipped.
pub async fn discover(
    target: SocketAddr,
    timeout: Duration,
    attempts: u32,
) -> Result<DiscoveryReply, NetworkError> {
    let bind_addr: SocketAddr = if target.is_ipv4() {
        "0.0.0.0:0".parse().map_err(|_| NetworkError::InvalidAddress(target.to_string()))?
    } else {
        "[::]:0".parse().map_err(|_| NetworkError::InvalidAddress(target.to_string()))?
    };
    let socket = UdpSocket::from_std(bind_udp(bind_addr, true)?)
        .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

    let mut buf = [0u8; MAX_DISCOVERY_DATAGRAM];
    for attempt in 1..=attempts.max(1) {
        socket
            .send_to(b"discover", target)
            .await
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, socket.recv_from(&mut buf)).await {
                Ok(Ok((len, from))) => match DiscoveryReply::decode(&buf[..len]) {
                    Ok(reply) => {
                        tracing::debug!(%from, attempt, "Discovered relay at {}:{}", reply.host, reply.port);
                        return Ok(reply);
                    }
                    Err(e) => {
                        tracing::debug!(%from, "Ignoring discovery datagram: {}", e);
                    }
                },
                Ok(Err(e)) => {
                    tracing::debug!("Discovery receive error: {}", e);
                }
                Err(_) => break,
            }
        }
    }

    Err(NetworkError::ServerNotFound)
}
