//! Relay client runtime
//!
//! Runs on its own thread with blocking sockets, like a capture thread. The
//! device layer plugs in through [`AudioSource`] and [`AudioSink`]; whoever
//! tracks game state drives channel membership through [`ClientController`].

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::audio::Frame;
use crate::config::ClientConfig;
use crate::error::{Error, FrameError, NetworkError};
use crate::protocol::Handshake;

/// Back-off when the source has nothing captured
const IDLE_POLL: Duration = Duration::from_millis(5);

/// Produces one frame of recently captured audio
pub trait AudioSource: Send + 'static {
    fn capture_frame(&mut self) -> Option<Frame>;
}

/// Consumes one frame for immediate playback
pub trait AudioSink: Send + 'static {
    fn play_frame(&mut self, frame: Frame);
}

/// Membership events delivered to the client thread
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelCommand {
    Join(String),
    Leave,
    Shutdown,
}

/// Connection state visible to the controller
#[derive(Debug, Clone, PartialEq)]
pub enum ClientStatus {
    Idle,
    Connected { channel: String },
    Stopped,
}

/// Where and how to talk to the relay
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub server: SocketAddr,
    pub frame_size: usize,
    pub handshake_size: usize,
    pub io_timeout: Duration,
}

impl ClientSettings {
    pub fn new(server: SocketAddr, config: &ClientConfig) -> Self {
        Self {
            server,
            frame_size: config.buffer_size,
            handshake_size: config.handshake_size,
            io_timeout: config.io_timeout(),
        }
    }
}

/// An open, handshaken stream connection
struct Connection {
    stream: TcpStream,
    frame_size: usize,
    inbound: Vec<u8>,
}

impl Connection {
    fn open(settings: &ClientSettings, channel: &str) -> Result<Self, Error> {
        let region = Handshake::new(channel).encode(settings.handshake_size)?;

        let mut stream = TcpStream::connect_timeout(&settings.server, settings.io_timeout)
            .map_err(|e| NetworkError::ConnectionFailed(format!("{}: {}", settings.server, e)))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(settings.io_timeout))?;
        stream.set_write_timeout(Some(settings.io_timeout))?;

        stream
            .write_all(&region)
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;

        Ok(Self {
            stream,
            frame_size: settings.frame_size,
            inbound: vec![0u8; Frame::wire_len(settings.frame_size)],
        })
    }

    /// Send one captured frame, receive one mixed frame
    fn exchange(&mut self, frame: &Frame) -> Result<Frame, Error> {
        if frame.len() != self.frame_size {
            return Err(FrameError::SizeMismatch {
                expected: Frame::wire_len(self.frame_size),
                actual: Frame::wire_len(frame.len()),
            }
            .into());
        }

        self.stream
            .write_all(&frame.to_bytes())
            .map_err(|e| NetworkError::SendFailed(e.to_string()))?;
        self.stream
            .read_exact(&mut self.inbound)
            .map_err(|e| NetworkError::ReceiveFailed(e.to_string()))?;

        Ok(Frame::from_le_bytes(&self.inbound, self.frame_size)?)
    }
}

/// Handle to a running client thread
pub struct ClientController {
    commands: Sender<ChannelCommand>,
    status: Arc<Mutex<ClientStatus>>,
    handle: Option<JoinHandle<()>>,
}

impl ClientController {
    /// Start the client thread; it stays idle until told to join a channel
    pub fn spawn<S, K>(settings: ClientSettings, source: S, sink: K) -> Result<Self, Error>
    where
        S: AudioSource,
        K: AudioSink,
    {
        let (commands, command_rx) = unbounded();
        let status = Arc::new(Mutex::new(ClientStatus::Idle));
        let thread_status = status.clone();

        let handle = thread::Builder::new()
            .name("relay-client".into())
            .spawn(move || client_loop(settings, source, sink, command_rx, thread_status))?;

        Ok(Self {
            commands,
            status,
            handle: Some(handle),
        })
    }

    /// Connect to `channel`, leaving the current one first
    pub fn join_channel(&self, channel: impl Into<String>) -> Result<(), NetworkError> {
        self.send(ChannelCommand::Join(channel.into()))
    }

    pub fn leave_channel(&self) -> Result<(), NetworkError> {
        self.send(ChannelCommand::Leave)
    }

    pub fn status(&self) -> ClientStatus {
        self.status.lock().clone()
    }

    /// Stop the thread and wait for it
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn send(&self, command: ChannelCommand) -> Result<(), NetworkError> {
        self.commands
            .send(command)
            .map_err(|_| NetworkError::ConnectionFailed("client thread has stopped".into()))
    }

    fn stop(&mut self) {
        let _ = self.commands.send(ChannelCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Relay client thread panicked");
            }
        }
    }
}

impl Drop for ClientController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn client_loop<S: AudioSource, K: AudioSink>(
    settings: ClientSettings,
    mut source: S,
    mut sink: K,
    commands: Receiver<ChannelCommand>,
    status: Arc<Mutex<ClientStatus>>,
) {
    let mut connection: Option<Connection> = None;

    loop {
        let command = if connection.is_some() {
            match commands.try_recv() {
                Ok(command) => Some(command),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => break,
            }
        } else {
            match commands.recv_timeout(Duration::from_millis(100)) {
                Ok(command) => Some(command),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        };

        match command {
            Some(ChannelCommand::Join(channel)) => {
                connection = None;
                match Connection::open(&settings, &channel) {
                    Ok(opened) => {
                        tracing::info!("Joined channel {} on {}", channel, settings.server);
                        connection = Some(opened);
                        *status.lock() = ClientStatus::Connected { channel };
                    }
                    Err(e) => {
                        tracing::warn!("Failed to join channel {}: {}", channel, e);
                        *status.lock() = ClientStatus::Idle;
                    }
                }
            }
            Some(ChannelCommand::Leave) => {
                if connection.take().is_some() {
                    tracing::info!("Left channel");
                }
                *status.lock() = ClientStatus::Idle;
            }
            Some(ChannelCommand::Shutdown) => break,
            None => {}
        }

        let Some(active) = connection.as_mut() else {
            continue;
        };

        // Nothing captured means nothing to play either
        let Some(frame) = source.capture_frame() else {
            thread::sleep(IDLE_POLL);
            continue;
        };

        match active.exchange(&frame) {
            Ok(mixed) => sink.play_frame(mixed),
            Err(e) => {
                tracing::warn!("Relay connection lost: {}", e);
                connection = None;
                *status.lock() = ClientStatus::Idle;
            }
        }
    }

    *status.lock() = ClientStatus::Stopped;
    tracing::debug!("Relay client stopped");
}
