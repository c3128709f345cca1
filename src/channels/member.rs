//! Channel member state

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::audio::{Frame, FrameBuffer, LevelMeter};
use crate::constants::INBOUND_BUFFER_FRAMES;

/// Identifier assigned to a connection when it is accepted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First group is enough to tell sessions apart in logs
        let simple = self.0.simple().to_string();
        f.write_str(&simple[..8])
    }
}

/// A connected client inside one channel
///
/// The channel key is fixed for the member's lifetime.
pub struct Member {
    id: SessionId,
    address: SocketAddr,
    channel: String,
    joined_at: DateTime<Utc>,
    inbound: FrameBuffer,
    level: LevelMeter,
}

impl Member {
    pub fn new(id: SessionId, address: SocketAddr, channel: impl Into<String>) -> Self {
        Self {
            id,
            address,
            channel: channel.into(),
            joined_at: Utc::now(),
            inbound: FrameBuffer::new(INBOUND_BUFFER_FRAMES),
            level: LevelMeter::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn joined_at(&self) -> DateTime<Utc> {
        self.joined_at
    }

    /// Queue an inbound frame; returns the frame evicted to make room
    pub fn push_frame(&self, frame: Frame) -> Option<Frame> {
        self.inbound.push(frame)
    }

    /// Take the oldest pending frame
    pub fn pop_frame(&self) -> Option<Frame> {
        self.inbound.pop()
    }

    pub fn pending_frames(&self) -> usize {
        self.inbound.len()
    }

    pub fn evicted_frames(&self) -> u64 {
        self.inbound.evicted_count()
    }

    pub fn record_level(&self, level_db: f32) {
        self.level.record(level_db);
    }

    pub fn level_db(&self) -> f32 {
        self.level.get()
    }
}

impl fmt::Debug for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Member")
            .field("id", &self.id)
            .field("address", &self.address)
            .field("channel", &self.channel)
            .field("pending", &self.inbound.len())
            .finish()
    }
}
