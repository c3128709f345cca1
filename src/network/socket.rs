//! Socket creation helpers
//!
//! Sockets are built with `socket2` so reuse-address, broadcast and the
//! listen backlog can be set before binding, then handed to tokio.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use crate::error::NetworkError;

fn bind_error(addr: SocketAddr, e: std::io::Error) -> NetworkError {
    NetworkError::BindFailed {
        addr: addr.to_string(),
        reason: e.to_string(),
    }
}

/// Create a non-blocking UDP socket bound to `addr`
pub fn bind_udp(addr: SocketAddr, broadcast: bool) -> Result<std::net::UdpSocket, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| bind_error(addr, e))?;

    socket.set_reuse_address(true).map_err(|e| bind_error(addr, e))?;
    if broadcast {
        socket.set_broadcast(true).map_err(|e| bind_error(addr, e))?;
    }
    socket.set_nonblocking(true).map_err(|e| bind_error(addr, e))?;
    socket.bind(&addr.into()).map_err(|e| bind_error(addr, e))?;

    Ok(socket.into())
}

/// Create a non-blocking TCP listener bound to `addr`
pub fn bind_tcp_listener(addr: SocketAddr, backlog: i32) -> Result<std::net::TcpListener, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| bind_error(addr, e))?;

    socket.set_reuse_address(true).map_err(|e| bind_error(addr, e))?;
    socket.set_nonblocking(true).map_err(|e| bind_error(addr, e))?;
    socket.bind(&addr.into()).map_err(|e| bind_error(addr, e))?;
    socket.listen(backlog).map_err(|e| bind_error(addr, e))?;

    Ok(socket.into())
}

/// Best guess at this machine's LAN address
///
/// Connecting a UDP socket sends nothing; it only selects the outbound
/// interface. Falls back to loopback when there is no route.
pub fn local_ip() -> IpAddr {
    let probe = || -> std::io::Result<IpAddr> {
        let socket = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
        Ok(socket.local_addr()?.ip())
    };

    match probe() {
        Ok(ip) if !ip.is_unspecified() => ip,
        Ok(_) => IpAddr::V4(Ipv4Addr::LOCALHOST),
        Err(e) => {
            tracing::warn!("Could not determine local IP, using loopback: {}", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}
