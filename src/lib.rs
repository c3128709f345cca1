//! # LAN Voice Relay
//!
//! Multi-channel real-time voice relay: clients join named channels and every
//! member hears the mix of everyone else in the channel, excluding itself.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────────────┐
//! │                              RELAY SERVER                                  │
//! │                                                                           │
//! │  ┌──────────────────────┐          ┌──────────────────────────────────┐   │
//! │  │ Discovery Responder  │  UDP     │  TCP accept loop (network::server)│   │
//! │  │ (network::discovery) │◄─────────┤  one session task per connection  │   │
//! │  │ {host, port} reply   │          └───────────────┬──────────────────┘   │
//! │  └──────────────────────┘                          │                      │
//! │                                                    ▼                      │
//! │  ┌─────────────────────────────────────────────────────────────────────┐  │
//! │  │                 Session (network::session)                          │  │
//! │  │  AWAITING_HANDSHAKE ──► ACTIVE ──► CLOSED                           │  │
//! │  │  [512-byte JSON {channel}]  recv frame → level → push → mix → send  │  │
//! │  └───────────────┬───────────────────────────────────┬─────────────────┘  │
//! │                  │ join / leave / push               │ mix_for(member)    │
//! │                  ▼                                   ▼                    │
//! │  ┌──────────────────────────────────┐   ┌──────────────────────────────┐  │
//! │  │ Channel Registry                 │◄──┤ Mixer                        │  │
//! │  │ (channels::registry)             │   │ pop ≤1 frame per other member│  │
//! │  │ key → members, id → member       │   │ mean, clip to [-1, 1]        │  │
//! │  │ Member: 5-frame drop-oldest FIFO │   └──────────────────────────────┘  │
//! │  └───────────────┬──────────────────┘                                     │
//! │                  │ snapshots only                                         │
//! │                  ▼                                                        │
//! │  ┌──────────────────────────────────┐   ┌──────────────────────────────┐  │
//! │  │ Status Reporter (status)         │   │ HTTP status API (ui)         │  │
//! │  └──────────────────────────────────┘   └──────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Playback cadence follows capture cadence: a member only receives a mixed
//! frame in response to a frame it sent. An idle client therefore stalls its
//! own playback.

pub mod audio;
pub mod channels;
pub mod config;
pub mod error;
pub mod mixer;
pub mod network;
pub mod protocol;
pub mod status;
#[cfg(feature = "http-ui")]
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Default UDP port for server discovery
    pub const DEFAULT_DISCOVERY_PORT: u16 = 65431;

    /// Default TCP port for audio streaming
    pub const DEFAULT_STREAM_PORT: u16 = 65432;

    /// Default number of mono samples per frame
    pub const DEFAULT_BUFFER_SIZE: usize = 1024;

    /// Bytes per sample on the wire (IEEE-754 f32)
    pub const BYTES_PER_SAMPLE: usize = 4;

    /// Maximum frames held in a member's inbound buffer
    pub const INBOUND_BUFFER_FRAMES: usize = 5;

    /// Size of the handshake region a client sends after connecting
    pub const DEFAULT_HANDSHAKE_SIZE: usize = 512;

    /// Default time a new connection has to deliver its handshake
    pub const DEFAULT_HANDSHAKE_TIMEOUT_MS: u64 = 5000;

    /// Floor for level metering in dB (silence guard)
    pub const LEVEL_FLOOR_DB: f32 = -100.0;

    /// Largest discovery datagram read
    pub const MAX_DISCOVERY_DATAGRAM: usize = 1024;

    /// Default status render interval
    pub const DEFAULT_STATUS_INTERVAL_MS: u64 = 500;

    /// Default HTTP port for the status API
    pub const DEFAULT_HTTP_PORT: u16 = 8080;

    /// Default TCP listen backlog
    pub const DEFAULT_LISTEN_BACKLOG: i32 = 10;

    /// Sample rate the probe client renders its test tone at
    pub const PROBE_SAMPLE_RATE: u32 = 44100;
}
