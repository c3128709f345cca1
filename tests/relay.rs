//! End-to-end relay behaviour over real sockets

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;

use lan_voice_relay::{
    audio::Frame,
    channels::ChannelRegistry,
    config::ServerConfig,
    network::{discover, RelayServer, ShutdownHandle},
    protocol::Handshake,
};

const N: usize = 64;
const HANDSHAKE: usize = 512;

struct Running {
    stream_addr: SocketAddr,
    discovery_addr: SocketAddr,
    registry: Arc<ChannelRegistry>,
    shutdown: ShutdownHandle,
    task: JoinHandle<lan_voice_relay::Result<()>>,
}

impl Running {
    fn start() -> Self {
        Self::start_with(N)
    }

    fn start_with(buffer_size: usize) -> Self {
        let config = ServerConfig {
            buffer_size,
            handshake_timeout_ms: 200,
            ..ServerConfig::loopback()
        };
        let server = RelayServer::bind(&config).unwrap();
        Self {
            stream_addr: server.stream_addr(),
            discovery_addr: server.discovery_addr(),
            registry: server.registry(),
            shutdown: server.shutdown_handle(),
            task: tokio::spawn(server.run()),
        }
    }

    async fn stop(self) {
        self.shutdown.shutdown();
        tokio::time::timeout(Duration::from_secs(3), self.task)
            .await
            .expect("server did not stop")
            .unwrap()
            .unwrap();
    }

    async fn join(&self, channel: &str) -> TcpStream {
        let mut stream = TcpStream::connect(self.stream_addr).await.unwrap();
        let region = Handshake::new(channel).encode(HANDSHAKE).unwrap();
        stream.write_all(&region).await.unwrap();
        stream
    }

    async fn wait_for_members(&self, channel: &str, count: usize) {
        for _ in 0..200 {
            if self.registry.members_of(channel).len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("channel {} never reached {} members", channel, count);
    }
}

async fn exchange(stream: &mut TcpStream, frame: &Frame) -> Frame {
    stream.write_all(&frame.to_bytes()).await.unwrap();
    let mut buf = vec![0u8; Frame::wire_len(N)];
    stream.read_exact(&mut buf).await.unwrap();
    Frame::from_le_bytes(&buf, N).unwrap()
}

async fn expect_closed(stream: &mut TcpStream) {
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(2), stream.read(&mut buf))
        .await
        .expect("server kept the connection open");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn discovery_reports_bound_stream_endpoint() {
    let server = Running::start();

    let reply = discover(server.discovery_addr, Duration::from_millis(500), 3)
        .await
        .unwrap();
    assert_eq!(reply.stream_addr().unwrap(), server.stream_addr);

    server.stop().await;
}

#[tokio::test]
async fn silent_connection_is_rejected() {
    let server = Running::start();

    let mut stream = TcpStream::connect(server.stream_addr).await.unwrap();
    expect_closed(&mut stream).await;
    assert_eq!(server.registry.channel_count(), 0);
    assert_eq!(server.registry.member_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn empty_channel_key_is_rejected() {
    let server = Running::start();

    let mut stream = server.join("").await;
    expect_closed(&mut stream).await;
    assert_eq!(server.registry.member_count(), 0);

    server.stop().await;
}

#[tokio::test]
async fn mix_averages_pending_frames_of_others() {
    let server = Running::start();

    let a = server.join("g").await;
    let b = server.join("g").await;
    let mut c = server.join("g").await;
    server.wait_for_members("g", 3).await;

    let a_addr = a.local_addr().unwrap();
    let b_addr = b.local_addr().unwrap();
    for member in server.registry.members_of("g") {
        if member.address() == a_addr {
            member.push_frame(Frame::filled(N, 0.5));
        } else if member.address() == b_addr {
            member.push_frame(Frame::filled(N, 0.25));
        }
    }

    let mixed = exchange(&mut c, &Frame::filled(N, 0.9)).await;
    assert!(mixed.samples().iter().all(|&s| (s - 0.375).abs() < 1e-6));

    // Both frames were consumed; the next pass hears nobody
    let mixed = exchange(&mut c, &Frame::filled(N, 0.9)).await;
    assert_eq!(mixed, Frame::silence(N));

    drop(a);
    drop(b);
    drop(c);
    server.stop().await;
}

#[tokio::test]
async fn own_frames_never_come_back() {
    let server = Running::start();

    let mut solo = server.join("solo").await;
    server.wait_for_members("solo", 1).await;
    for _ in 0..8 {
        let mixed = exchange(&mut solo, &Frame::filled(N, 0.7)).await;
        assert_eq!(mixed, Frame::silence(N));
    }

    drop(solo);
    server.stop().await;
}

#[tokio::test]
async fn disconnect_cleans_up_and_rejoin_is_fresh() {
    let server = Running::start();

    let first = server.join("lobby").await;
    server.wait_for_members("lobby", 1).await;
    let old_generation = server.registry.channel_generation("lobby").unwrap();

    drop(first);
    for _ in 0..200 {
        if !server.registry.contains_channel("lobby") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(!server.registry.contains_channel("lobby"));
    assert!(server.registry.members_of("lobby").is_empty());

    let second = server.join("lobby").await;
    server.wait_for_members("lobby", 1).await;
    assert!(server.registry.channel_generation("lobby").unwrap() > old_generation);

    drop(second);
    server.stop().await;
}

#[tokio::test]
async fn shutdown_closes_active_sessions() {
    let server = Running::start();

    let mut stream = server.join("live").await;
    server.wait_for_members("live", 1).await;
    let registry = server.registry.clone();

    server.stop().await;
    expect_closed(&mut stream).await;
    assert_eq!(registry.channel_count(), 0);
    assert!(TcpStream::connect(stream.peer_addr().unwrap()).await.is_err());
}

#[tokio::test]
async fn shutdown_is_not_blocked_by_peer_that_never_reads() {
    const WIDE: usize = 4096;
    let server = Running::start_with(WIDE);

    let mut deaf = server.join("deaf").await;
    server.wait_for_members("deaf", 1).await;

    let frame = Frame::filled(WIDE, 0.2).to_bytes();
    let mut stalled = false;
    for _ in 0..10_000 {
        match tokio::time::timeout(Duration::from_millis(200), deaf.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => panic!("write failed before stalling: {}", e),
            Err(_) => {
                stalled = true;
                break;
            }
        }
    }
    assert!(stalled, "socket buffers never filled");

    let registry = server.registry.clone();
    server.stop().await;
    assert_eq!(registry.member_count(), 0);
    drop(deaf);
}
