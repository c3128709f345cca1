//! Per-connection session
//!
//! ```text
//! AWAITING_HANDSHAKE ──(valid handshake)──► ACTIVE ──(EOF / I/O error / shutdown)──► CLOSED
//!         └──────────(timeout / malformed / empty key)──────────────────────────────►┘
//! ```
//!
//! While active the session runs a strict request/response cadence: one
//! frame in, one mixed frame out. Registry teardown is tied to a guard so it
//! runs exactly once whichever path ends the session.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::watch;

use crate::audio::Frame;
use crate::channels::{ChannelRegistry, Member, SessionId};
use crate::config::ServerConfig;
use crate::error::{Error, NetworkError, ProtocolError};
use crate::mixer::Mixer;
use crate::network::stats::ServerStats;
use crate::protocol::Handshake;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingHandshake,
    Active,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::AwaitingHandshake => "AWAITING_HANDSHAKE",
            SessionState::Active => "ACTIVE",
            SessionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// Framing parameters shared by all sessions of a server
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub frame_size: usize,
    pub handshake_size: usize,
    pub handshake_timeout: Duration,
}

impl From<&ServerConfig> for SessionSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            frame_size: config.buffer_size,
            handshake_size: config.handshake_size,
            handshake_timeout: config.handshake_timeout(),
        }
    }
}

/// What a finished session did
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: SessionId,
    pub peer: SocketAddr,
    /// Channel joined, if the handshake succeeded
    pub channel: Option<String>,
    pub frames_received: u64,
    pub mixes_sent: u64,
    pub state: SessionState,
}

/// Removes the member from the registry when dropped
struct Membership {
    registry: Arc<ChannelRegistry>,
    id: SessionId,
}

impl Drop for Membership {
    fn drop(&mut self) {
        self.registry.leave(self.id);
    }
}

/// One client connection
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    stream: TcpStream,
    registry: Arc<ChannelRegistry>,
    mixer: Arc<Mixer>,
    stats: Arc<ServerStats>,
    settings: SessionSettings,
    state: SessionState,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        registry: Arc<ChannelRegistry>,
        mixer: Arc<Mixer>,
        stats: Arc<ServerStats>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            id: SessionId::new(),
            peer,
            stream,
            registry,
            mixer,
            stats,
            settings,
            state: SessionState::AwaitingHandshake,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    fn transition(&mut self, next: SessionState) {
        tracing::debug!(session = %self.id, peer = %self.peer, "{} -> {}", self.state, next);
        self.state = next;
    }

    /// Drive the session to completion
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> SessionSummary {
        self.stats.session_opened();
        let mut summary = SessionSummary {
            id: self.id,
            peer: self.peer,
            channel: None,
            frames_received: 0,
            mixes_sent: 0,
            state: self.state,
        };

        let handshake = match self.handshake(&mut shutdown).await {
            Ok(handshake) => handshake,
            Err(e) => {
                self.stats.handshake_rejected();
                tracing::warn!(session = %self.id, peer = %self.peer, "Rejected connection: {}", e);
                return self.close(summary).await;
            }
        };

        let member = match self.registry.join(&handshake.channel, self.id, self.peer) {
            Ok(member) => member,
            Err(e) => {
                self.stats.handshake_rejected();
                tracing::warn!(session = %self.id, peer = %self.peer, "Join failed: {}", e);
                return self.close(summary).await;
            }
        };
        let membership = Membership {
            registry: self.registry.clone(),
            id: self.id,
        };

        summary.channel = Some(handshake.channel.clone());
        self.transition(SessionState::Active);
        tracing::info!(
            session = %self.id,
            "[+] {} joined channel: {}",
            self.peer,
            handshake.channel
        );

        match self.stream_loop(&member, &mut summary, &mut shutdown).await {
            Ok(()) => {}
            Err(e) => {
                tracing::debug!(session = %self.id, peer = %self.peer, "Session error: {}", e);
            }
        }

        drop(membership);
        tracing::info!(
            session = %self.id,
            "[-] {} left channel: {}",
            self.peer,
            handshake.channel
        );

        self.close(summary).await
    }

    async fn close(mut self, mut summary: SessionSummary) -> SessionSummary {
        self.transition(SessionState::Closed);
        // Peer may already be gone
        let _ = self.stream.shutdown().await;
        self.stats.session_closed();
        summary.state = self.state;
        summary
    }

    async fn handshake(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<Handshake, Error> {
        // A session spawned after the flag flipped never sees `changed()`
        if *shutdown.borrow() {
            return Err(NetworkError::ConnectionFailed("server shutting down".into()).into());
        }

        let mut region = vec![0u8; self.settings.handshake_size];
        let timeout = self.settings.handshake_timeout;

        tokio::select! {
            read = tokio::time::timeout(timeout, self.stream.read_exact(&mut region)) => {
                match read {
                    Err(_) => {
                        return Err(ProtocolError::HandshakeTimeout(timeout.as_millis() as u64).into());
                    }
                    Ok(Err(e)) => {
                        return Err(NetworkError::ReceiveFailed(e.to_string()).into());
                    }
                    Ok(Ok(_)) => {}
                }
            }
            _ = shutdown.changed() => {
                return Err(NetworkError::ConnectionFailed("server shutting down".into()).into());
            }
        }

        Ok(Handshake::decode(&region)?)
    }

    /// Receive, mix, reply until the peer goes away or the server stops
    async fn stream_loop(
        &mut self,
        member: &Member,
        summary: &mut SessionSummary,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), Error> {
        let frame_size = self.settings.frame_size;
        let mut buf = vec![0u8; Frame::wire_len(frame_size)];

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            tokio::select! {
                read = self.stream.read_exact(&mut buf) => {
                    match read {
                        Ok(_) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                        Err(e) => return Err(NetworkError::ReceiveFailed(e.to_string()).into()),
                    }
                }
                _ = shutdown.changed() => return Ok(()),
            }

            let frame = Frame::from_le_bytes(&buf, frame_size)?;
            summary.frames_received += 1;
            self.stats.frame_received();

            member.record_level(frame.level_db());
            if member.push_frame(frame).is_some() {
                self.stats.frame_evicted();
            }

            // A peer that stops reading must not pin the session past shutdown
            let reply = self.mixer.mix_for(member).frame.to_bytes();
            tokio::select! {
                written = self.stream.write_all(&reply) => {
                    written.map_err(|e| NetworkError::SendFailed(e.to_string()))?;
                }
                _ = shutdown.changed() => return Ok(()),
            }

            summary.mixes_sent += 1;
            self.stats.mix_sent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const N: usize = 8;

    struct Harness {
        registry: Arc<ChannelRegistry>,
        stats: Arc<ServerStats>,
        listener: TcpListener,
        shutdown: watch::Sender<bool>,
    }

    impl Harness {
        async fn new() -> Self {
            Self {
                registry: Arc::new(ChannelRegistry::new()),
                stats: Arc::new(ServerStats::new()),
                listener: TcpListener::bind("127.0.0.1:0").await.unwrap(),
                shutdown: watch::channel(false).0,
            }
        }

        fn settings() -> SessionSettings {
            SessionSettings {
                frame_size: N,
                handshake_size: 64,
                handshake_timeout: Duration::from_millis(300),
            }
        }

        /// Connect a client and spawn the server side of the session
        async fn connect(&self) -> (TcpStream, tokio::task::JoinHandle<SessionSummary>) {
            self.connect_with(Self::settings()).await
        }

        async fn connect_with(
            &self,
            settings: SessionSettings,
        ) -> (TcpStream, tokio::task::JoinHandle<SessionSummary>) {
            let client = TcpStream::connect(self.listener.local_addr().unwrap()).await.unwrap();
            let (stream, peer) = self.listener.accept().await.unwrap();
            let session = Session::new(
                stream,
                peer,
                self.registry.clone(),
                Arc::new(Mixer::new(self.registry.clone(), N)),
                self.stats.clone(),
                settings,
            );
            assert_eq!(session.state(), SessionState::AwaitingHandshake);
            let task = tokio::spawn(session.run(self.shutdown.subscribe()));
            (client, task)
        }
    }

    async fn send_handshake(client: &mut TcpStream, channel: &str) {
        let region = Handshake::new(channel).encode(64).unwrap();
        client.write_all(&region).await.unwrap();
    }

    async fn exchange(client: &mut TcpStream, frame: &Frame) -> Frame {
        client.write_all(&frame.to_bytes()).await.unwrap();
        let mut buf = vec![0u8; Frame::wire_len(N)];
        client.read_exact(&mut buf).await.unwrap();
        Frame::from_le_bytes(&buf, N).unwrap()
    }

    async fn wait_for_members(registry: &ChannelRegistry, channel: &str, count: usize) {
        for _ in 0..100 {
            if registry.members_of(channel).len() == count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("channel {} never reached {} members", channel, count);
    }

    #[tokio::test]
    async fn test_lone_member_hears_silence() {
        let harness = Harness::new().await;
        let (mut client, task) = harness.connect().await;
        send_handshake(&mut client, "solo").await;

        let mixed = exchange(&mut client, &Frame::filled(N, 0.8)).await;
        assert_eq!(mixed, Frame::silence(N));

        drop(client);
        let summary = task.await.unwrap();
        assert_eq!(summary.channel.as_deref(), Some("solo"));
        assert_eq!(summary.frames_received, 1);
        assert_eq!(summary.mixes_sent, 1);
        assert_eq!(summary.state, SessionState::Closed);
        assert!(!harness.registry.contains_channel("solo"));
    }

    #[tokio::test]
    async fn test_member_hears_peer_not_self() {
        let harness = Harness::new().await;
        let (mut alice, alice_task) = harness.connect().await;
        let (mut bob, bob_task) = harness.connect().await;
        send_handshake(&mut alice, "duo").await;
        send_handshake(&mut bob, "duo").await;
        wait_for_members(&harness.registry, "duo", 2).await;

        // Alice's frame waits in her buffer; Bob's request consumes it
        let for_alice = exchange(&mut alice, &Frame::filled(N, 0.5)).await;
        assert_eq!(for_alice, Frame::silence(N));

        let for_bob = exchange(&mut bob, &Frame::filled(N, -0.25)).await;
        assert_eq!(for_bob, Frame::filled(N, 0.5));

        let for_alice = exchange(&mut alice, &Frame::filled(N, 0.1)).await;
        assert_eq!(for_alice, Frame::filled(N, -0.25));

        drop(alice);
        drop(bob);
        alice_task.await.unwrap();
        bob_task.await.unwrap();
        assert_eq!(harness.registry.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_handshake_rejected() {
        let harness = Harness::new().await;
        let (mut client, task) = harness.connect().await;

        let summary = task.await.unwrap();
        assert!(summary.channel.is_none());
        assert_eq!(summary.state, SessionState::Closed);
        assert_eq!(harness.registry.member_count(), 0);
        assert_eq!(harness.stats.snapshot().handshakes_rejected, 1);

        let mut buf = [0u8; 1];
        let read = client.read(&mut buf).await;
        assert!(matches!(read, Ok(0) | Err(_)));
    }

    #[tokio::test]
    async fn test_empty_channel_rejected() {
        let harness = Harness::new().await;
        let (mut client, task) = harness.connect().await;
        send_handshake(&mut client, "").await;

        let summary = task.await.unwrap();
        assert!(summary.channel.is_none());
        assert_eq!(harness.registry.channel_count(), 0);
    }

    #[tokio::test]
    async fn test_garbage_handshake_rejected() {
        let harness = Harness::new().await;
        let (mut client, task) = harness.connect().await;
        client.write_all(&[0xAB; 64]).await.unwrap();

        let summary = task.await.unwrap();
        assert!(summary.channel.is_none());
        assert_eq!(harness.stats.snapshot().handshakes_rejected, 1);
    }

    #[tokio::test]
    async fn test_shutdown_tears_down_active_session() {
        let harness = Harness::new().await;
        let (mut client, task) = harness.connect().await;
        send_handshake(&mut client, "stop").await;
        wait_for_members(&harness.registry, "stop", 1).await;

        harness.shutdown.send(true).unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary.state, SessionState::Closed);
        assert!(!harness.registry.contains_channel("stop"));

        let snapshot = harness.stats.snapshot();
        assert_eq!(snapshot.sessions_opened, 1);
        assert_eq!(snapshot.sessions_closed, 1);
    }

    #[tokio::test]
    async fn test_session_started_after_shutdown_closes_at_once() {
        let harness = Harness::new().await;
        harness.shutdown.send_replace(true);

        let settings = SessionSettings {
            handshake_timeout: Duration::from_secs(30),
            ..Harness::settings()
        };
        let (_client, task) = harness.connect_with(settings).await;

        let summary = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .expect("session waited for the handshake timeout")
            .unwrap();
        assert!(summary.channel.is_none());
        assert_eq!(summary.state, SessionState::Closed);
    }

    #[tokio::test]
    async fn test_shutdown_unblocks_reply_to_non_reading_peer() {
        const WIDE: usize = 4096;
        let harness = Harness::new().await;
        let settings = SessionSettings {
            frame_size: WIDE,
            ..Harness::settings()
        };
        let (mut client, task) = harness.connect_with(settings).await;
        send_handshake(&mut client, "deaf").await;
        wait_for_members(&harness.registry, "deaf", 1).await;

        // Keep sending, never read: replies pile up until the server blocks
        let frame = Frame::filled(WIDE, 0.1).to_bytes();
        let mut stalled = false;
        for _ in 0..10_000 {
            match tokio::time::timeout(Duration::from_millis(200), client.write_all(&frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => panic!("write failed before stalling: {}", e),
                Err(_) => {
                    stalled = true;
                    break;
                }
            }
        }
        assert!(stalled, "socket buffers never filled");

        harness.shutdown.send(true).unwrap();
        let summary = tokio::time::timeout(Duration::from_secs(3), task)
            .await
            .expect("session stuck writing after shutdown")
            .unwrap();
        assert_eq!(summary.state, SessionState::Closed);
        assert!(!harness.registry.contains_channel("deaf"));
        drop(client);
    }

    #[tokio::test]
    async fn test_fast_talker_evicts_oldest() {
        let harness = Harness::new().await;
        let (mut talker, talker_task) = harness.connect().await;
        let (mut listener, listener_task) = harness.connect().await;
        send_handshake(&mut talker, "busy").await;
        send_handshake(&mut listener, "busy").await;
        wait_for_members(&harness.registry, "busy", 2).await;

        for i in 0..7 {
            exchange(&mut talker, &Frame::filled(N, i as f32 / 10.0)).await;
        }
        assert_eq!(harness.stats.snapshot().frames_evicted, 2);

        // Oldest surviving frame is the third one sent
        let heard = exchange(&mut listener, &Frame::silence(N)).await;
        assert!((heard.samples()[0] - 0.2).abs() < 1e-6);

        drop(talker);
        drop(listener);
        talker_task.await.unwrap();
        listener_task.await.unwrap();
    }
}
