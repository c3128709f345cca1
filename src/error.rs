//! Error types for the voice relay

use thiserror::Error;

use crate::channels::SessionId;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Frame codec errors
#[derive(Error, Debug, PartialEq)]
pub enum FrameError {
    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Frame must contain at least one sample")]
    Empty,
}

/// Wire protocol errors (handshake and discovery payloads)
#[derive(Error, Debug, PartialEq)]
pub enum ProtocolError {
    #[error("Handshake not received within {0} ms")]
    HandshakeTimeout(u64),

    #[error("Malformed handshake: {0}")]
    MalformedHandshake(String),

    #[error("Handshake carries an empty channel key")]
    EmptyChannel,

    #[error("Handshake of {size} bytes exceeds the {limit} byte region")]
    HandshakeTooLarge { size: usize, limit: usize },

    #[error("Malformed discovery reply: {0}")]
    MalformedDiscovery(String),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket bind failed on {addr}: {reason}")]
    BindFailed { addr: String, reason: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("No relay server answered discovery")]
    ServerNotFound,

    #[error("Timeout")]
    Timeout,
}

/// Channel registry errors
#[derive(Error, Debug, PartialEq)]
pub enum ChannelError {
    #[error("Channel key must not be empty")]
    EmptyKey,

    #[error("Session {0} is already a channel member")]
    AlreadyJoined(SessionId),

    #[error("Session {0} is not a channel member")]
    NotFound(SessionId),
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
